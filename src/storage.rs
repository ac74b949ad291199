//! Enrollment store and reference images.
//!
//! The store is a single postcard blob holding two index-aligned lists,
//! names and embeddings. It is loaded once, kept in memory, and rewritten in
//! full after every successful registration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use facegate_vision::Embedding;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

pub const REFERENCE_IMAGE: &str = "face.jpg";

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub name: String,
    pub embedding: Embedding,
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    names: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug)]
pub struct EnrollmentStore {
    path: PathBuf,
    records: Vec<EnrollmentRecord>,
}

impl EnrollmentStore {
    /// Empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    /// Load the store at `path`, or start empty when no file exists yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            log::debug!("no store at {}, starting empty", path.display());
            return Ok(Self::new(path));
        }

        let data = std::fs::read(&path)?;
        let file: StoreFile = postcard::from_bytes(&data)?;
        let records = decode(file)?;
        log::debug!("loaded {} enrollment(s) from {}", records.len(), path.display());
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[EnrollmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    /// Embedding length shared by every record, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.len())
    }

    /// Append a record and rewrite the file. The in-memory store is left
    /// unchanged if the record is rejected or the write fails.
    pub fn insert(&mut self, record: EnrollmentRecord) -> Result<()> {
        self.check(&record.name, &record.embedding)?;
        self.records.push(record);
        if let Err(e) = self.save() {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Whether `name` with `embedding` could be inserted.
    pub fn check(&self, name: &str, embedding: &Embedding) -> Result<()> {
        if self.contains(name) {
            return Err(AuthError::DuplicateName(name.to_string()));
        }
        if embedding.is_empty() {
            return Err(AuthError::EmptyEmbedding);
        }
        match self.dimension() {
            Some(expected) if embedding.len() != expected => Err(AuthError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Rewrite the whole file through a temporary sibling and a rename.
    pub fn save(&self) -> Result<()> {
        let file = StoreFile {
            names: self.records.iter().map(|r| r.name.clone()).collect(),
            embeddings: self.records.iter().map(|r| r.embedding.vector.clone()).collect(),
        };
        let data = postcard::to_allocvec(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        log::debug!("wrote {} enrollment(s) to {}", self.records.len(), self.path.display());
        Ok(())
    }
}

fn decode(file: StoreFile) -> Result<Vec<EnrollmentRecord>> {
    if file.names.len() != file.embeddings.len() {
        return Err(AuthError::CorruptStore(format!(
            "{} names but {} embeddings",
            file.names.len(),
            file.embeddings.len()
        )));
    }

    let mut seen = HashSet::new();
    for name in &file.names {
        if !seen.insert(name.as_str()) {
            return Err(AuthError::CorruptStore(format!("duplicate name {name:?}")));
        }
    }
    if let Some(name) = file
        .names
        .iter()
        .zip(&file.embeddings)
        .find_map(|(name, vector)| vector.is_empty().then_some(name))
    {
        return Err(AuthError::CorruptStore(format!("empty embedding for {name:?}")));
    }

    Ok(file
        .names
        .into_iter()
        .zip(file.embeddings)
        .map(|(name, vector)| EnrollmentRecord {
            name,
            embedding: Embedding::new(vector),
        })
        .collect())
}

/// Names key both the store and a directory under the users root, so they
/// must be non-empty single path components.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0']);
    if bad {
        return Err(AuthError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

pub fn reference_image_path(users_dir: &Path, name: &str) -> PathBuf {
    users_dir.join(name).join(REFERENCE_IMAGE)
}

/// Write the raw captured frame as `<users_dir>/<name>/face.jpg`.
pub fn save_reference_image(users_dir: &Path, name: &str, frame: &DynamicImage) -> Result<PathBuf> {
    let path = reference_image_path(users_dir, name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    frame.save_with_format(&path, image::ImageFormat::Jpeg)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, vector: &[f32]) -> EnrollmentRecord {
        EnrollmentRecord {
            name: name.to_string(),
            embedding: Embedding::new(vector.to_vec()),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnrollmentStore::load(dir.path().join("encodings.bin")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/encodings.bin");

        let mut store = EnrollmentStore::new(&path);
        store.insert(record("zed", &[0.1, 0.2, 0.3])).unwrap();
        store.insert(record("amy", &[0.4, 0.5, 0.6])).unwrap();
        store.insert(record("bob", &[-1.0, 0.0, 1.0])).unwrap();

        let reloaded = EnrollmentStore::load(&path).unwrap();
        assert_eq!(reloaded.records(), store.records());
        assert_eq!(reloaded.names().collect::<Vec<_>>(), vec!["zed", "amy", "bob"]);
        assert!(!dir.path().join("data/encodings.bin.tmp").exists());
    }

    #[test]
    fn test_duplicate_rejected_without_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        let mut store = EnrollmentStore::new(&path);
        store.insert(record("amy", &[1.0, 2.0])).unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = store.insert(record("amy", &[3.0, 4.0])).unwrap_err();
        assert!(matches!(err, AuthError::DuplicateName(ref n) if n == "amy"));
        assert_eq!(store.len(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EnrollmentStore::new(dir.path().join("encodings.bin"));
        store.insert(record("amy", &[1.0, 2.0])).unwrap();

        let err = store.insert(record("bob", &[1.0, 2.0, 3.0])).unwrap_err();
        assert!(matches!(
            err,
            AuthError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_embedding_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        let mut store = EnrollmentStore::new(&path);

        let err = store.insert(record("amy", &[])).unwrap_err();
        assert!(matches!(err, AuthError::EmptyEmbedding));
        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);
        assert!(!path.exists());

        store.insert(record("amy", &[1.0, 2.0])).unwrap();
        assert!(matches!(
            store.insert(record("bob", &[])),
            Err(AuthError::EmptyEmbedding)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_embedding_in_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        let file = StoreFile {
            names: vec!["amy".into()],
            embeddings: vec![vec![]],
        };
        std::fs::write(&path, postcard::to_allocvec(&file).unwrap()).unwrap();

        assert!(matches!(
            EnrollmentStore::load(&path),
            Err(AuthError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_misaligned_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        let file = StoreFile {
            names: vec!["amy".into(), "bob".into()],
            embeddings: vec![vec![1.0]],
        };
        std::fs::write(&path, postcard::to_allocvec(&file).unwrap()).unwrap();

        assert!(matches!(
            EnrollmentStore::load(&path),
            Err(AuthError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_duplicate_names_in_file_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.bin");
        let file = StoreFile {
            names: vec!["amy".into(), "amy".into()],
            embeddings: vec![vec![1.0], vec![2.0]],
        };
        std::fs::write(&path, postcard::to_allocvec(&file).unwrap()).unwrap();

        assert!(matches!(
            EnrollmentStore::load(&path),
            Err(AuthError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the store file should be makes the rename fail
        let path = dir.path().join("encodings.bin");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut store = EnrollmentStore::new(&path);
        assert!(store.insert(record("amy", &[1.0])).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  alice ").unwrap(), "alice");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn test_reference_image_written() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let frame = DynamicImage::ImageRgb8(pixels);
        let path = save_reference_image(dir.path(), "amy", &frame).unwrap();
        assert_eq!(path, dir.path().join("amy").join("face.jpg"));
        assert_eq!(image::open(&path).unwrap().width(), 8);
    }
}
