//! Camera source backed by image files on disk.
//!
//! Points at either a single image or a directory of images. Each session
//! replays the files in name order and then reports end of stream.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::camera::{CameraError, CameraSource, Frame, FrameSource};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Debug, Clone)]
pub struct StillCamera {
    path: PathBuf,
}

impl StillCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame_paths(&self) -> Result<VecDeque<PathBuf>, CameraError> {
        if self.path.is_file() {
            return Ok(VecDeque::from([self.path.clone()]));
        }
        if !self.path.is_dir() {
            return Err(CameraError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let entries = std::fs::read_dir(&self.path)
            .map_err(|e| CameraError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no images in {}",
                self.path.display()
            )));
        }
        Ok(paths.into())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CameraSource for StillCamera {
    type Session = StillSession;

    fn open(&mut self) -> Result<StillSession, CameraError> {
        let pending = self.frame_paths()?;
        log::debug!(
            "opened still camera at {} with {} frame(s)",
            self.path.display(),
            pending.len()
        );
        Ok(StillSession { pending })
    }
}

pub struct StillSession {
    pending: VecDeque<PathBuf>,
}

impl FrameSource for StillSession {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let path = self.pending.pop_front().ok_or(CameraError::EndOfStream)?;
        let img = image::open(&path)
            .map_err(|e| CameraError::Capture(format!("{}: {e}", path.display())))?;
        log::debug!("read still frame {}", path.display());
        Ok(img.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("a/face.PNG")));
        assert!(has_image_extension(Path::new("face.jpeg")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("noext")));
    }

    #[test]
    fn test_missing_path_is_unavailable() {
        let mut cam = StillCamera::new("/nonexistent/facegate/frames");
        assert!(matches!(cam.open(), Err(CameraError::Unavailable(_))));
    }
}
