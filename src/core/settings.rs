//! HC-011: Compiler settings, loaded from `hostcat.toml`.

use super::error::{CompileError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings that change how a compilation behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Environment name recorded on the type collection
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Reject any attempt to reopen the unnamed top-level class
    #[serde(default)]
    pub freeze_main: bool,

    /// Fail on references to undefined variables instead of yielding undef
    #[serde(default)]
    pub strict_variables: bool,

    /// Directory searched for manifests
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            freeze_main: false,
            strict_variables: false,
            manifest_dir: default_manifest_dir(),
        }
    }
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("manifests")
}

/// Parse settings from TOML.
pub fn parse_settings(content: &str) -> Result<Settings> {
    toml::from_str(content).map_err(|e| CompileError::Settings(e.to_string()))
}

/// Load settings from disk. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CompileError::io(format!("cannot read {}", path.display()), e))?;
    parse_settings(&content)
}
