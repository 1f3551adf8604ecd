//! Settings management

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory name used under the platform data dir.
pub const APP_DIR: &str = "accelcheck";

/// Environment variable ANGLE reads to pick its platform.
pub const DEFAULT_DIRECTIVE: &str = "ACCEL_ANGLE_PLATFORM";

/// Where the probe keeps its durable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Sentinel whose existence means the last probe never finished.
    pub crash_check_path: PathBuf,
    /// Persisted backend token.
    pub backend_path: PathBuf,
    /// Environment variable the surface subsystem reads at startup.
    pub backend_directive: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);
        Self::in_dir(root)
    }
}

impl ProbeSettings {
    /// Settings with both files placed in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            crash_check_path: dir.join("gl_check"),
            backend_path: dir.join("angle_backend"),
            backend_directive: DEFAULT_DIRECTIVE.to_string(),
        }
    }

    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist. Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| StoreError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }
}
