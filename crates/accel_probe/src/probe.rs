//! Capability probe
//!
//! Creates a throwaway accelerated context, checks it against the features
//! the renderer cannot live without, links a minimal shader program, and
//! classifies what the driver negotiated. Only context creation can crash;
//! it runs inside a [`CrashBracket`](crate::CrashBracket).

use crate::capabilities::{Capabilities, Feature, NegotiatedFormat, TRANSPARENCY_ALPHA_BITS};
use crate::crash_guard::CrashGuard;
use crate::diagnostics::Diagnostics;
use crate::shader::{ShaderProgram, SMOKE_PROGRAM};
use crate::switch::ForceDisable;
use accel_store::DurableMarker;
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Errors a context factory or context can report. The probe turns every
/// one of them into `supported: false`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no accelerated adapter is available")]
    NoAdapter,

    #[error("could not create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("could not create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface is not compatible with the adapter")]
    IncompatibleSurface,

    #[error("shader program '{label}' failed to link: {message}")]
    Link { label: &'static str, message: String },
}

/// What the probe asks of the surface it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest {
    /// Requested alpha depth on top of the base format.
    pub alpha_bits: u8,
}

impl Default for SurfaceRequest {
    fn default() -> Self {
        Self {
            alpha_bits: TRANSPARENCY_ALPHA_BITS,
        }
    }
}

/// Driver identification strings for the one-time diagnostic log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverInfo {
    pub renderer: String,
    pub vendor: String,
    pub version: String,
    pub extensions: Vec<String>,
}

/// A live accelerated context, queried after creation.
pub trait ProbeContext {
    fn has_feature(&self, feature: Feature) -> bool;

    /// Compiles and links `program`.
    fn link_program(&self, program: &ShaderProgram) -> Result<(), ProbeError>;

    /// The format the driver actually negotiated.
    fn format(&self) -> NegotiatedFormat;

    fn driver_info(&self) -> DriverInfo;
}

/// Creates accelerated contexts, optionally bound to an existing target.
pub trait ContextFactory {
    /// An existing window or surface the host wants probed.
    type Target;
    type Context: ProbeContext;

    /// Checked before the crash bracket. `Err` carries the reason to log.
    fn check_target(&self, target: &Self::Target) -> Result<(), &'static str>;

    /// Materializes a context and forces its initialization to complete
    /// before returning. This is the step that may kill the process.
    fn create_context(
        &mut self,
        target: Option<&Self::Target>,
        request: SurfaceRequest,
    ) -> Result<Self::Context, ProbeError>;
}

/// Runs the capability check against a context factory.
#[derive(Debug)]
pub struct CapabilityProbe<F, M> {
    factory: F,
    guard: CrashGuard<M>,
    force_disable: ForceDisable,
    diagnostics: Diagnostics,
}

impl<F, M> CapabilityProbe<F, M>
where
    F: ContextFactory,
    M: DurableMarker,
{
    pub fn new(factory: F, guard: CrashGuard<M>, force_disable: ForceDisable) -> Self {
        Self {
            factory,
            guard,
            force_disable,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn guard(&self) -> &CrashGuard<M> {
        &self.guard
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Whether the previous run died inside its probe. Call this before the
    /// first [`check_capabilities`](Self::check_capabilities) of the run.
    pub fn previous_run_crashed(&self) -> bool {
        self.guard.previous_run_crashed()
    }

    /// Probes for accelerated rendering. Never fails: every problem yields
    /// `Capabilities::default()`.
    pub fn check_capabilities(&mut self, target: Option<&F::Target>) -> Capabilities {
        if self.force_disable.is_set() {
            self.diagnostics
                .once("force-disabled", || tracing::info!("OpenGL: Force-disabled."));
            return Capabilities::default();
        }

        let request = SurfaceRequest::default();
        if let Some(target) = target {
            if let Err(reason) = self.factory.check_target(target) {
                self.diagnostics
                    .once("target-unsupported", || tracing::warn!("OpenGL: {reason}"));
                return Capabilities::default();
            }
        }

        // Panics are caught while the bracket is still open.
        let created = {
            let _bracket = self.guard.bracket();
            panic::catch_unwind(AssertUnwindSafe(|| {
                self.factory.create_context(target, request)
            }))
        };

        let context = match created {
            Ok(Ok(context)) => context,
            Ok(Err(err)) => return self.no_context(&err),
            Err(payload) => return self.no_context(&panic_message(payload.as_ref())),
        };

        for feature in Feature::REQUIRED {
            if !context.has_feature(feature) {
                self.diagnostics.once(feature_key(feature), || {
                    tracing::warn!("OpenGL: {} not supported.", feature.describe())
                });
                return Capabilities::default();
            }
        }

        if let Err(err) = context.link_program(&SMOKE_PROGRAM) {
            self.diagnostics.once("shader-link", || {
                tracing::warn!("OpenGL: Could not link simple shader: {err}")
            });
            return Capabilities::default();
        }

        let format = context.format();
        match format.profile_name() {
            Some(name) => self
                .diagnostics
                .once(profile_key(name), || tracing::info!("OpenGL Profile: {name}.")),
            None => {
                self.diagnostics
                    .once("profile-none", || tracing::warn!("OpenGL Profile: None."));
                return Capabilities::default();
            }
        }

        self.diagnostics.once("driver-info", || {
            let info = context.driver_info();
            tracing::info!("OpenGL Renderer: {}", info.renderer);
            tracing::info!("OpenGL Vendor: {}", info.vendor);
            tracing::info!("OpenGL Version: {}", info.version);
            tracing::info!("OpenGL Extensions: {}", info.extensions.join(", "));
        });

        let version = format.version();
        let transparency = format.has_transparency();
        if transparency {
            self.diagnostics.once("context-created", || {
                tracing::info!("OpenGL: context created, version: {version}.")
            });
        } else {
            self.diagnostics.once("context-created-opaque", || {
                tracing::info!("OpenGL: context without alpha created, version: {version}.")
            });
        }

        Capabilities {
            supported: true,
            transparency,
        }
    }

    fn no_context(&mut self, reason: &dyn Display) -> Capabilities {
        self.diagnostics.once("no-context", || {
            tracing::warn!("OpenGL: Could not create widget in a window: {reason}")
        });
        Capabilities::default()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "context creation panicked"
    }
}

fn feature_key(feature: Feature) -> &'static str {
    match feature {
        Feature::NpotTextures => "missing-npot",
        Feature::Framebuffers => "missing-framebuffers",
        Feature::Shaders => "missing-shaders",
    }
}

fn profile_key(name: &'static str) -> &'static str {
    match name {
        "OpenGLES" => "profile-gles",
        "Core" => "profile-core",
        _ => "profile-compatibility",
    }
}
