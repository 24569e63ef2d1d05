//! One-way failover from the preferred backend to the fallback.
//!
//! Backends report fatal errors through a hook that pushes into a shared
//! inbox tagged with the mount that failed; `poll` drains it on the session's
//! dispatch. Errors from mounts that are no longer active are stale and
//! dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use render::{
    BackendKind, Camera, Container, FatalError, RasterTileBackend, RenderBackend, VectorConfig,
    VectorTileBackend,
};
use streaming::TileLoader;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailoverState {
    PrimaryActive,
    FallbackActive,
}

/// Builds the two backends of a session.
pub trait BackendFactory: Send {
    fn primary(&mut self, config: &SessionConfig) -> Box<dyn RenderBackend>;

    fn fallback(&mut self, config: &SessionConfig) -> Box<dyn RenderBackend>;
}

type LoaderFn = Box<dyn FnMut(BackendKind) -> Box<dyn TileLoader> + Send>;

/// Vector primary and raster fallback, each fed by a fresh loader.
pub struct TileBackendFactory {
    loaders: LoaderFn,
}

impl TileBackendFactory {
    pub fn new(loaders: impl FnMut(BackendKind) -> Box<dyn TileLoader> + Send + 'static) -> Self {
        Self {
            loaders: Box::new(loaders),
        }
    }
}

impl BackendFactory for TileBackendFactory {
    fn primary(&mut self, config: &SessionConfig) -> Box<dyn RenderBackend> {
        let vector = VectorConfig {
            access_token: config.access_token.clone(),
            style: config.style.clone(),
            retina: config.retina,
            ..VectorConfig::default()
        };
        Box::new(VectorTileBackend::new(vector, (self.loaders)(BackendKind::Vector)))
    }

    fn fallback(&mut self, _config: &SessionConfig) -> Box<dyn RenderBackend> {
        Box::new(RasterTileBackend::new((self.loaders)(BackendKind::Raster)))
    }
}

/// What a switch between backends left behind for the session to rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: BackendKind,
    pub to: BackendKind,
    /// The fatal error that triggered the switch; `None` for a manual retry.
    pub reason: Option<FatalError>,
    /// Camera the new backend was mounted at.
    pub camera: Camera,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailoverOutcome {
    Transitioned(Transition),
    /// The fallback itself failed. There is nothing further to switch to.
    FallbackFailed(FatalError),
}

pub struct FailoverController {
    config: SessionConfig,
    factory: Box<dyn BackendFactory>,
    container: Container,
    state: FailoverState,
    active: Option<Box<dyn RenderBackend>>,
    inbox: Arc<Mutex<VecDeque<FatalError>>>,
    last_fatal: Option<FatalError>,
    failovers: u32,
}

impl FailoverController {
    pub fn new(config: SessionConfig, factory: Box<dyn BackendFactory>, container: Container) -> Self {
        let state = if config.has_token() {
            FailoverState::PrimaryActive
        } else {
            FailoverState::FallbackActive
        };
        Self {
            config,
            factory,
            container,
            state,
            active: None,
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            last_fatal: None,
            failovers: 0,
        }
    }

    /// Mounts the backend for the current state at `camera`. Without a
    /// credential the primary is never built.
    pub fn mount(&mut self, camera: Camera) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(render::RenderError::AlreadyMounted.into());
        }
        let backend = match self.state {
            FailoverState::PrimaryActive => self.factory.primary(&self.config),
            FailoverState::FallbackActive => {
                info!("no map credential, starting on the fallback map");
                self.factory.fallback(&self.config)
            }
        };
        self.install(backend, camera)
    }

    fn install(&mut self, mut backend: Box<dyn RenderBackend>, camera: Camera) -> Result<(), SessionError> {
        let inbox = Arc::clone(&self.inbox);
        backend.on_fatal_error(Box::new(move |err| inbox.lock().push_back(err)));
        backend.mount(&self.container, camera)?;
        self.active = Some(backend);
        Ok(())
    }

    fn release_active(&mut self) -> Option<Camera> {
        let mut old = self.active.take()?;
        let camera = old.camera();
        if let Err(e) = old.unmount(&self.container) {
            warn!(backend = %old.kind(), "unmount failed: {e}");
        }
        Some(camera)
    }

    /// Applies queued fatal errors. At most one transition happens per
    /// mounted primary; errors from earlier mounts are ignored.
    pub fn poll(&mut self) -> Result<Vec<FailoverOutcome>, SessionError> {
        let pending: Vec<FatalError> = self.inbox.lock().drain(..).collect();
        let mut out = Vec::new();
        for err in pending {
            let current = self.active.as_ref().and_then(|b| b.mount_id());
            if current != Some(err.mount) {
                debug!(mount = %err.mount, "ignoring fatal error from a stale mount");
                continue;
            }
            self.last_fatal = Some(err.clone());
            match self.state {
                FailoverState::PrimaryActive => {
                    out.push(FailoverOutcome::Transitioned(self.fail_over(err)?));
                }
                FailoverState::FallbackActive => {
                    warn!(error = %err, "fallback map failed");
                    out.push(FailoverOutcome::FallbackFailed(err));
                }
            }
        }
        Ok(out)
    }

    fn fail_over(&mut self, reason: FatalError) -> Result<Transition, SessionError> {
        let from = reason.backend;
        let camera = self
            .release_active()
            .unwrap_or(self.config.initial_camera);
        self.state = FailoverState::FallbackActive;
        self.failovers += 1;
        let fallback = self.factory.fallback(&self.config);
        let to = fallback.kind();
        self.install(fallback, camera)?;
        warn!(%from, %to, error = %reason, "switched to the fallback map");
        Ok(Transition {
            from,
            to,
            reason: Some(reason),
            camera,
        })
    }

    /// Leaves the fallback for a fresh primary. `Ok(None)` when the primary
    /// is already active.
    pub fn retry_primary(&mut self, camera: Camera) -> Result<Option<Transition>, SessionError> {
        if self.state == FailoverState::PrimaryActive {
            return Ok(None);
        }
        if !self.config.has_token() {
            return Err(SessionError::MissingCredential);
        }
        let from = self
            .active
            .as_ref()
            .map(|b| b.kind())
            .unwrap_or(BackendKind::Raster);
        self.release_active();
        self.inbox.lock().clear();
        self.state = FailoverState::PrimaryActive;
        let primary = self.factory.primary(&self.config);
        let to = primary.kind();
        self.install(primary, camera)?;
        info!(%from, %to, "retrying the primary map");
        Ok(Some(Transition {
            from,
            to,
            reason: None,
            camera,
        }))
    }

    /// Releases the active backend and its container claim.
    pub fn unmount(&mut self) {
        self.release_active();
        self.inbox.lock().clear();
    }

    /// Style used when a primary is (re)built.
    pub fn set_preferred_style(&mut self, style: render::StyleId) {
        self.config.style = style;
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn backend(&self) -> Option<&dyn RenderBackend> {
        self.active.as_deref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut dyn RenderBackend> {
        match self.active.as_mut() {
            Some(backend) => Some(backend.as_mut()),
            None => None,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn failover_count(&self) -> u32 {
        self.failovers
    }

    pub fn last_fatal(&self) -> Option<&FatalError> {
        self.last_fatal.as_ref()
    }
}
