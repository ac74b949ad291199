use std::path::PathBuf;
use std::time::{Duration, Instant};

use facegate_vision::{CameraSource, Embedding, FaceEngine, FrameSource};
use image::DynamicImage;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::matcher;
use crate::storage::{self, EnrollmentRecord, EnrollmentStore};
use crate::workflow::{Outcome, PendingCapture, Phase, Request};

/// Tunables the manager needs from the configuration file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub threshold: f32,
    pub capture_delay: Duration,
    pub users_dir: PathBuf,
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self {
            threshold: cfg.threshold,
            capture_delay: cfg.capture_delay(),
            users_dir: cfg.users_dir.clone(),
        }
    }
}

/// Owns the enrollment store and drives registration and authentication
/// through the camera and face engine collaborators.
pub struct Manager<C, E> {
    store: EnrollmentStore,
    camera: C,
    engine: E,
    settings: Settings,
    phase: Phase,
}

impl<C, E> Manager<C, E>
where
    C: CameraSource,
    E: FaceEngine,
{
    pub fn new(store: EnrollmentStore, camera: C, engine: E, settings: Settings) -> Self {
        Self {
            store,
            camera,
            engine,
            settings,
            phase: Phase::Idle,
        }
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Phase of the most recent workflow. A [`PendingCapture`] dropped without
    /// `complete` releases the camera but leaves this at `AwaitingCapture`
    /// until the next `begin`.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Validate `request`, open the camera and arm the capture deadline.
    ///
    /// Requests that can be rejected up front (bad or duplicate name, nothing
    /// enrolled to authenticate against) fail here without touching the camera.
    /// Can be called from any phase, including after an abandoned capture.
    pub fn begin(&mut self, request: Request) -> Result<PendingCapture<C::Session>> {
        let started = request.validate(&self.store).and_then(|request| {
            let session = self.camera.open()?;
            Ok((request, session))
        });

        match started {
            Ok((request, session)) => {
                debug!("camera open for {:?}", request);
                self.phase = Phase::AwaitingCapture;
                let ready_at = Instant::now() + self.settings.capture_delay;
                Ok(PendingCapture::new(request, session, ready_at))
            }
            Err(e) => {
                self.phase = Phase::Resolved;
                Err(e)
            }
        }
    }

    /// Grab a frame for `pending` and resolve its request. The camera session
    /// is released before this returns, whatever the result.
    pub fn complete(&mut self, pending: PendingCapture<C::Session>) -> Result<Outcome> {
        let (request, mut session) = pending.into_parts();
        let result = self.resolve(&request, &mut session);
        drop(session);
        self.phase = Phase::Resolved;

        match &result {
            Ok(outcome) => info!("{:?} resolved for {}", request, outcome.name()),
            Err(e) => warn!("{:?} failed: {}", request, e),
        }
        result
    }

    /// `begin`, wait out the capture delay, then `complete`.
    pub fn run(&mut self, request: Request) -> Result<Outcome> {
        let pending = self.begin(request)?;
        let wait = pending.remaining(Instant::now());
        if !wait.is_zero() {
            info!("Look at the camera, capturing in {:.1}s...", wait.as_secs_f32());
            std::thread::sleep(wait);
        }
        self.complete(pending)
    }

    /// Register `name` from an immediate capture.
    pub fn register(&mut self, name: &str) -> Result<Outcome> {
        let pending = self.begin(Request::register(name))?;
        self.complete(pending)
    }

    /// Authenticate from an immediate capture.
    pub fn authenticate(&mut self) -> Result<Outcome> {
        let pending = self.begin(Request::Authenticate)?;
        self.complete(pending)
    }

    fn resolve(&mut self, request: &Request, session: &mut C::Session) -> Result<Outcome> {
        let frame = session.read_frame()?;
        let image = DynamicImage::ImageRgb8(frame);
        let embedding = self.single_face_embedding(&image)?;

        match request {
            Request::Register { name } => self.enroll(name, embedding, &image),
            Request::Authenticate => self.identify(&embedding),
        }
    }

    fn single_face_embedding(&mut self, image: &DynamicImage) -> Result<Embedding> {
        let faces = self
            .engine
            .detect_faces(image)
            .map_err(AuthError::Engine)?;
        debug!("detected {} face(s)", faces.len());

        match faces.as_slice() {
            [] => Err(AuthError::NoFaceDetected),
            [face] => self
                .engine
                .compute_embedding(image, face)
                .map_err(AuthError::Engine),
            many => Err(AuthError::MultipleFacesDetected(many.len())),
        }
    }

    fn enroll(
        &mut self,
        name: &str,
        embedding: Embedding,
        image: &DynamicImage,
    ) -> Result<Outcome> {
        // The store may have changed while the capture was pending
        self.store.check(name, &embedding)?;

        let reference_image = storage::save_reference_image(&self.settings.users_dir, name, image)?;
        self.store.insert(EnrollmentRecord {
            name: name.to_string(),
            embedding,
        })?;

        Ok(Outcome::Registered {
            name: name.to_string(),
            reference_image,
        })
    }

    fn identify(&self, embedding: &Embedding) -> Result<Outcome> {
        let found = matcher::first_match(self.store.records(), embedding, self.settings.threshold)
            .ok_or(AuthError::AuthenticationFailed)?;
        Ok(Outcome::Authenticated {
            name: found.name.to_string(),
            distance: found.distance,
        })
    }
}
