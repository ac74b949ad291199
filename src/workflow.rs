//! Two-phase capture workflow.
//!
//! `Manager::begin` validates a request, opens the camera and arms a
//! deadline, yielding a [`PendingCapture`]. Once the deadline passes the
//! scheduler hands it back to `Manager::complete`, which grabs one frame and
//! resolves the request. The pending capture owns the camera session, so the
//! device is released when it is consumed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{AuthError, Result};
use crate::storage::{self, EnrollmentStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { name: String },
    Authenticate,
}

impl Request {
    pub fn register(name: impl Into<String>) -> Self {
        Request::Register { name: name.into() }
    }

    /// Reject what can be rejected against `store` alone: a bad or taken name,
    /// or authentication with nothing enrolled. Registration names come back
    /// trimmed.
    pub fn validate(self, store: &EnrollmentStore) -> Result<Request> {
        match self {
            Request::Register { name } => {
                let name = storage::validate_name(&name)?;
                if store.contains(name) {
                    return Err(AuthError::DuplicateName(name.to_string()));
                }
                Ok(Request::register(name))
            }
            Request::Authenticate => {
                if store.is_empty() {
                    return Err(AuthError::AuthenticationFailed);
                }
                Ok(Request::Authenticate)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Registered {
        name: String,
        reference_image: PathBuf,
    },
    Authenticated {
        name: String,
        distance: f32,
    },
}

impl Outcome {
    pub fn name(&self) -> &str {
        match self {
            Outcome::Registered { name, .. } | Outcome::Authenticated { name, .. } => name,
        }
    }
}

/// Where the manager is in the current workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingCapture,
    Resolved,
}

/// A started workflow waiting for its capture deadline.
pub struct PendingCapture<S> {
    request: Request,
    session: S,
    ready_at: Instant,
}

impl<S> PendingCapture<S> {
    pub(crate) fn new(request: Request, session: S, ready_at: Instant) -> Self {
        Self {
            request,
            session,
            ready_at,
        }
    }

    pub(crate) fn into_parts(self) -> (Request, S) {
        (self.request, self.session)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn ready_at(&self) -> Instant {
        self.ready_at
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.ready_at
    }

    /// Time left before the capture should happen, zero once due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.ready_at.saturating_duration_since(now)
    }
}

impl<S> std::fmt::Debug for PendingCapture<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCapture")
            .field("request", &self.request)
            .field("ready_at", &self.ready_at)
            .finish_non_exhaustive()
    }
}
