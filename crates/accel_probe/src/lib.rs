//! Accel Probe
//!
//! Decides whether hardware-accelerated rendering is usable on this machine,
//! guarding the risky context creation with a durable crash sentinel.

pub mod backend;
pub mod capabilities;
pub mod crash_guard;
pub mod device;
pub mod diagnostics;
pub mod probe;
pub mod shader;
pub mod switch;
pub mod window;

pub use wgpu;
pub use winit;

pub use backend::{
    platform_preference, AnglePreference, BackendPreference, BackendSelection, Directive,
    NoBackendPreference, ResolvedBackend,
};
pub use capabilities::{Capabilities, Feature, NegotiatedFormat, Profile, Renderable};
pub use crash_guard::{CrashBracket, CrashGuard};
pub use device::WgpuContextFactory;
pub use diagnostics::Diagnostics;
pub use probe::{
    CapabilityProbe, ContextFactory, DriverInfo, ProbeContext, ProbeError, SurfaceRequest,
};
pub use switch::ForceDisable;
