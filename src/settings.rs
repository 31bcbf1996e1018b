use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Settings file location when no `--config` flag is given.
pub const CONFIG_ENV: &str = "CIRCUITS_CONFIG";
/// Overrides `database_path` from the settings file.
pub const DATABASE_ENV: &str = "CIRCUITS_DB";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Default level when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("circuits.db"),
            log_level: "info".into(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file means defaults; so does one
    /// that does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    /// Resolve settings for a process: explicit config path, else `CIRCUITS_CONFIG`,
    /// then `CIRCUITS_DB`, then an explicit database path, each overriding the last.
    pub fn resolve(
        config_path: Option<&Path>,
        database_path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => Self::load(path)?,
            None => match env(CONFIG_ENV) {
                Some(path) if !path.is_empty() => Self::load(Path::new(&path))?,
                _ => Self::default(),
            },
        };

        if let Some(path) = env(DATABASE_ENV).filter(|path| !path.is_empty()) {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(path) = database_path {
            settings.database_path = path.to_path_buf();
        }

        Ok(settings)
    }
}
