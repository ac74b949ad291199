//! Turns workflow results into the single message shown to the user.

use std::fmt;

use facegate_vision::CameraError;

use crate::error::AuthError;
use crate::workflow::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    /// The attempt failed but another one may succeed.
    Retry,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub title: &'static str,
    pub body: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}

pub fn render(result: &Result<Outcome, AuthError>) -> Message {
    match result {
        Ok(outcome) => success(outcome),
        Err(e) => failure(e),
    }
}

fn success(outcome: &Outcome) -> Message {
    let body = match outcome {
        Outcome::Registered { name, .. } => format!("User {name} registered successfully!"),
        Outcome::Authenticated { name, .. } => format!("Welcome, {name}!"),
    };
    Message {
        level: Level::Success,
        title: "Success",
        body,
    }
}

fn failure(err: &AuthError) -> Message {
    let body = match err {
        AuthError::Camera(CameraError::Unavailable(_)) => "Could not start the camera!".to_string(),
        AuthError::Camera(_) => "Could not read an image from the camera!".to_string(),
        AuthError::NoFaceDetected => "No face found! Please try again.".to_string(),
        AuthError::MultipleFacesDetected(_) => {
            "More than one face detected! Please try again alone.".to_string()
        }
        AuthError::DuplicateName(name) => format!("The name {name} is already registered!"),
        AuthError::InvalidName(_) => "Please enter a valid name.".to_string(),
        AuthError::AuthenticationFailed => "Face not recognized! Access denied.".to_string(),
        other => format!("Something went wrong: {other}"),
    };
    let level = if err.is_retryable() {
        Level::Retry
    } else {
        Level::Error
    };
    Message {
        level,
        title: "Error",
        body,
    }
}
