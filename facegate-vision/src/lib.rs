pub mod camera;
pub mod face;
pub mod still;
pub mod yunet;

#[cfg(feature = "onnx")]
pub mod model;
#[cfg(feature = "onnx")]
pub mod pipeline;
#[cfg(feature = "v4l")]
pub mod video;

// Re-export commonly used types
pub use camera::{CameraError, CameraSource, Frame, FrameSource};
pub use face::{Detection, Embedding, FaceEngine};
pub use still::StillCamera;

#[cfg(feature = "onnx")]
pub use pipeline::OnnxEngine;
#[cfg(feature = "v4l")]
pub use video::Camera;
