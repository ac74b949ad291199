pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod matcher;
pub mod presenter;
pub mod storage;
pub mod workflow;

pub use error::AuthError;
pub use manager::{Manager, Settings};
pub use storage::{EnrollmentRecord, EnrollmentStore};
pub use workflow::{Outcome, PendingCapture, Phase, Request};

// Re-export collaborator types for convenience
pub use facegate_vision::{
    CameraError, CameraSource, Detection, Embedding, FaceEngine, Frame, FrameSource, StillCamera,
};
