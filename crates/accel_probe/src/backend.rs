//! Rendering backend preference
//!
//! On Windows the GL path goes through ANGLE, which can translate onto one of
//! several native APIs. The user's choice is stored as a short token in a
//! preference file, resolved once at startup, and handed to ANGLE through an
//! environment variable before any surface exists.
//!
//! Other platforms have no translation layer, so they get a no-op
//! [`NoBackendPreference`] instead of `cfg` checks at every call site.

use accel_store::DurableMarker;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Longest token we bother reading from the preference file.
const MAX_TOKEN_LEN: usize = 32;

/// ANGLE translation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendSelection {
    /// Let ANGLE decide.
    #[default]
    Auto = 0,
    /// Native desktop OpenGL
    OpenGl = 1,
    /// Direct3D 9
    D3D9 = 2,
    /// Direct3D 11
    D3D11 = 3,
    /// Direct3D 11 on 12
    D3D11On12 = 4,
}

impl BackendSelection {
    /// Tokens in matching order. A later match overrides an earlier one,
    /// which is how `d3d11on12` wins over its `d3d11` prefix.
    pub const KNOWN: [BackendSelection; 4] = [
        BackendSelection::OpenGl,
        BackendSelection::D3D9,
        BackendSelection::D3D11,
        BackendSelection::D3D11On12,
    ];

    /// Canonical file token; `None` for [`Auto`](Self::Auto), which is
    /// stored as the absence of the file.
    pub fn token(self) -> Option<&'static str> {
        match self {
            BackendSelection::Auto => None,
            BackendSelection::OpenGl => Some("gl"),
            BackendSelection::D3D9 => Some("d3d9"),
            BackendSelection::D3D11 => Some("d3d11"),
            BackendSelection::D3D11On12 => Some("d3d11on12"),
        }
    }

    /// Resolves file contents by token prefix.
    pub fn from_token(bytes: &[u8]) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .rev()
            .find(|backend| backend.token().is_some_and(|t| bytes.starts_with(t.as_bytes())))
    }

    /// Parses a user-facing name, including `auto`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name == "auto" {
            return Some(BackendSelection::Auto);
        }
        Self::KNOWN
            .into_iter()
            .find(|backend| backend.token() == Some(name.as_str()))
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => BackendSelection::OpenGl,
            2 => BackendSelection::D3D9,
            3 => BackendSelection::D3D11,
            4 => BackendSelection::D3D11On12,
            _ => BackendSelection::Auto,
        }
    }
}

/// Backend resolved for this process, shared between the preference and the
/// context factory. Clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBackend(Arc<AtomicU8>);

impl ResolvedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> BackendSelection {
        BackendSelection::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, backend: BackendSelection) {
        self.0.store(backend as u8, Ordering::Relaxed);
    }
}

/// Process environment variable read by the surface subsystem when it
/// initializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<String> {
        std::env::var(&self.name).ok()
    }

    fn publish(&self, value: &str) {
        std::env::set_var(&self.name, value);
    }

    fn clear(&self) {
        std::env::remove_var(&self.name);
    }
}

/// Persisted choice of translation backend.
pub trait BackendPreference {
    /// Reads the stored choice and publishes it for this process.
    /// Must run before any rendering context is created.
    fn configure(&self) -> BackendSelection;

    /// Stores a new choice. It takes effect on the next
    /// [`configure`](Self::configure), normally at the next start.
    fn change(&self, backend: BackendSelection);

    /// Backend resolved by the last [`configure`](Self::configure).
    fn current(&self) -> BackendSelection;
}

/// ANGLE backend preference stored in a marker.
#[derive(Debug)]
pub struct AnglePreference<M> {
    store: M,
    directive: Directive,
    resolved: ResolvedBackend,
}

impl<M: DurableMarker> AnglePreference<M> {
    pub fn new(store: M, directive: Directive, resolved: ResolvedBackend) -> Self {
        Self {
            store,
            directive,
            resolved,
        }
    }
}

impl<M: DurableMarker> BackendPreference for AnglePreference<M> {
    fn configure(&self) -> BackendSelection {
        self.directive.clear();
        self.resolved.set(BackendSelection::Auto);

        let bytes = match self.store.read(MAX_TOKEN_LEN) {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return BackendSelection::Auto,
            Err(err) => {
                tracing::debug!("ANGLE: could not read backend preference: {err}");
                return BackendSelection::Auto;
            }
        };

        let Some(backend) = BackendSelection::from_token(&bytes) else {
            tracing::warn!(
                "ANGLE Warning: Unknown backend: {}",
                String::from_utf8_lossy(&bytes)
            );
            return BackendSelection::Auto;
        };

        if let Some(token) = backend.token() {
            self.directive.publish(token);
        }
        self.resolved.set(backend);
        tracing::info!("ANGLE: using {backend:?} backend");
        backend
    }

    fn change(&self, backend: BackendSelection) {
        let result = match backend.token() {
            None => self.store.remove(),
            Some(token) => self.store.write(token.as_bytes()),
        };
        if let Err(err) = result {
            tracing::warn!("ANGLE Warning: could not store {backend:?}: {err}");
        }
    }

    fn current(&self) -> BackendSelection {
        self.resolved.get()
    }
}

/// Preference for platforms without a translation layer.
#[derive(Debug, Default)]
pub struct NoBackendPreference;

impl BackendPreference for NoBackendPreference {
    fn configure(&self) -> BackendSelection {
        BackendSelection::Auto
    }

    fn change(&self, backend: BackendSelection) {
        if backend != BackendSelection::Auto {
            tracing::debug!("Ignoring {backend:?}: no ANGLE on this platform");
        }
    }

    fn current(&self) -> BackendSelection {
        BackendSelection::Auto
    }
}

/// The preference implementation that applies to the current target.
pub fn platform_preference<M>(
    store: M,
    directive: Directive,
    resolved: ResolvedBackend,
) -> Box<dyn BackendPreference>
where
    M: DurableMarker + 'static,
{
    if cfg!(windows) {
        Box::new(AnglePreference::new(store, directive, resolved))
    } else {
        Box::new(NoBackendPreference)
    }
}
