//! Accel Store
//!
//! Durable on-disk state for the capability probe: the crash sentinel, the
//! backend preference file, and the settings that locate them.

pub mod error;
pub mod marker;
pub mod settings;

pub use error::StoreError;
pub use marker::{DurableMarker, FileMarker, MemoryMarker};
pub use settings::ProbeSettings;
