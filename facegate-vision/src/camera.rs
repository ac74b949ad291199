//! Camera collaborator contract.
//!
//! A [`CameraSource`] opens sessions; a session is a [`FrameSource`] that
//! yields frames until it is dropped. Dropping the session releases the
//! device, so every exit path of a capture closes it exactly once.

use image::{ImageBuffer, Rgb};
use thiserror::Error;

/// A captured RGB frame.
pub type Frame = ImageBuffer<Rgb<u8>, Vec<u8>>;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera stream ended")]
    EndOfStream,
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Something that can open a camera session.
pub trait CameraSource {
    type Session: FrameSource;

    fn open(&mut self) -> Result<Self::Session, CameraError>;
}

/// An open camera session. Closing happens on drop.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}
