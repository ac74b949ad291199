use facegate_vision::CameraError;
use thiserror::Error;

/// Every way a registration or authentication attempt can end without success.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{0} faces detected, expected exactly one")]
    MultipleFacesDetected(usize),
    #[error("name {0:?} is already enrolled")]
    DuplicateName(String),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("no enrolled face matched")]
    AuthenticationFailed,
    #[error("face engine returned an empty embedding")]
    EmptyEmbedding,
    #[error("embedding has {actual} dimensions, store holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("face engine failed: {0:#}")]
    Engine(anyhow::Error),
    #[error("enrollment store is corrupt: {0}")]
    CorruptStore(String),
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("store encoding: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("reference image: {0}")]
    Image(#[from] image::ImageError),
}

impl AuthError {
    /// Bad input from the user rather than a fault of the system; retrying
    /// with a better capture or another name can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::Camera(_)
                | AuthError::NoFaceDetected
                | AuthError::MultipleFacesDetected(_)
                | AuthError::DuplicateName(_)
                | AuthError::InvalidName(_)
                | AuthError::AuthenticationFailed
        )
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
