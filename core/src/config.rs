use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Experiment flags consumed by [`crate::Reporter`], fixed at construction.
///
/// `display_ncols` and `display_env` are stored for external option surfaces
/// and do not change the reporter's own behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReporterOptions {
    /// Root directory holding one sub-directory per experiment.
    pub checkpoints_dir: PathBuf,
    /// Experiment name; also the sub-directory name under `checkpoints_dir`.
    pub name: String,
    /// Whether this is a training run. HTML reporting is training-only.
    pub is_train: bool,
    /// Disables the HTML report even in training mode.
    pub no_html: bool,
    /// Display window size in pixels; used as the report's image width.
    pub crop_size: u32,
    /// Port a live display server would listen on.
    pub display_port: u16,
    #[serde(default = "default_ncols")]
    pub display_ncols: u32,
    #[serde(default = "default_env")]
    pub display_env: String,
}

fn default_ncols() -> u32 {
    2
}

fn default_env() -> String {
    "main".to_string()
}

impl ReporterOptions {
    pub fn new(checkpoints_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            checkpoints_dir: PathBuf::from("./checkpoints"),
            name: "experiment".to_string(),
            is_train: true,
            no_html: false,
            crop_size: 256,
            display_port: 8097,
            display_ncols: default_ncols(),
            display_env: default_env(),
        }
    }
}

/// Load a JSON configuration from disk, creating it with the provided
/// initializer if missing.
pub fn load_or_init<T, F>(path: &Path, initializer: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        return Ok(value);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let value = initializer();
    let serialized = serde_json::to_string_pretty(&value)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    Ok(value)
}
