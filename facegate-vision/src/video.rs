//! V4L2 webcam source.

use image::ImageBuffer;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::camera::{CameraError, CameraSource, Frame, FrameSource};

/// Webcam identified by its device node, e.g. `/dev/video0`.
#[derive(Debug, Clone)]
pub struct Camera {
    device: String,
}

impl Camera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CameraSource for Camera {
    type Session = CameraSession;

    fn open(&mut self) -> Result<CameraSession, CameraError> {
        let unavailable =
            |e: std::io::Error| CameraError::Unavailable(format!("{}: {e}", self.device));

        let dev = Device::with_path(&self.device).map_err(unavailable)?;
        let mut fmt = dev.format().map_err(unavailable)?;
        // Prefer RGB, fall back to YUYV, else keep whatever the driver reports
        let rgb = FourCC::new(b"RGB3");
        fmt = dev
            .set_format(&Format::new(fmt.width, fmt.height, rgb))
            .unwrap_or(fmt);
        if fmt.fourcc != rgb {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).map_err(unavailable)?;

        log::info!(
            "opened camera {} ({}x{} {:?})",
            self.device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(CameraSession {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }
}

/// Streaming session; the device is released when this is dropped.
pub struct CameraSession {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl FrameSource for CameraSession {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let (data, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        log::debug!(
            "captured frame: {}x{} fourcc={:?} seq={} len={}",
            self.width,
            self.height,
            self.fourcc,
            meta.sequence,
            data.len()
        );

        let buf = match &self.fourcc.repr {
            b"RGB3" => data.to_vec(),
            b"YUYV" => yuyv_to_rgb(self.width, self.height, data)?,
            b"GREY" => grey_to_rgb(self.width, self.height, data)?,
            other => {
                return Err(CameraError::Capture(format!(
                    "unsupported pixel format {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        let expected = (self.width * self.height * 3) as usize;
        if buf.len() < expected {
            return Err(CameraError::Capture(format!(
                "buffer too small: got {}, expected {expected}",
                buf.len()
            )));
        }
        ImageBuffer::from_raw(self.width, self.height, buf)
            .ok_or_else(|| CameraError::Capture("failed to build image buffer".into()))
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        log::debug!("releasing camera stream");
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, CameraError> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(CameraError::Capture("short YUYV buffer".into()));
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, CameraError> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(CameraError::Capture("short GREY buffer".into()));
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        let rgb = yuyv_to_rgb(2, 1, &[100, 128, 200, 128]).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_short_buffers_rejected() {
        assert!(yuyv_to_rgb(4, 4, &[0; 8]).is_err());
        assert!(grey_to_rgb(4, 4, &[0; 8]).is_err());
    }

    #[test]
    fn test_grey_expands_channels() {
        assert_eq!(grey_to_rgb(2, 1, &[7, 9]).unwrap(), vec![7, 7, 7, 9, 9, 9]);
    }
}
