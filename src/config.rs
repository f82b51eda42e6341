use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::BencherError;
use crate::types::OutputFormat;

pub const DEFAULT_ITERATIONS: usize = 5;
pub const CONFIG_ENV: &str = "BENCHER_CONFIG";
pub const SYSFS_ENV: &str = "BENCHER_SYSFS_ROOT";

/// Optional settings from `config.toml`. Every key may be omitted.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub iterations: Option<usize>,
    pub pin_core: Option<usize>,
    pub scratch_dir: Option<PathBuf>,
    pub isa: Option<String>,
    pub sysfs_root: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl Settings {
    /// Load from `$BENCHER_CONFIG`, or `<config dir>/bencher/config.toml`.
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load() -> Result<Self, BencherError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(p) => PathBuf::from(p),
            None => match dirs::config_dir() {
                Some(dir) => dir.join("bencher").join("config.toml"),
                None => return Ok(Self::default()),
            },
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, BencherError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(BencherError::InvalidConfig {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                });
            }
        };
        let settings = Self::parse(&text).map_err(|detail| BencherError::InvalidConfig {
            path: path.to_path_buf(),
            detail,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    fn parse(text: &str) -> Result<Self, String> {
        let settings: Settings = toml::from_str(text).map_err(|e| e.message().to_string())?;
        if settings.iterations == Some(0) {
            return Err("iterations must be at least 1".to_string());
        }
        Ok(settings)
    }

    pub fn iterations(&self) -> usize {
        self.iterations.unwrap_or(DEFAULT_ITERATIONS)
    }

    /// `$BENCHER_SYSFS_ROOT` wins over the config file; `/sys` otherwise.
    pub fn sysfs_root(&self) -> PathBuf {
        std::env::var_os(SYSFS_ENV)
            .map(PathBuf::from)
            .or_else(|| self.sysfs_root.clone())
            .unwrap_or_else(|| PathBuf::from("/sys"))
    }

    /// Prefers tmpfs so writing the captured output does not touch a disk.
    pub fn scratch_dir(&self) -> PathBuf {
        if let Some(dir) = &self.scratch_dir {
            return dir.clone();
        }
        let shm = Path::new("/dev/shm");
        if shm.is_dir() {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        }
    }

    pub fn isa(&self) -> String {
        self.isa
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }

    pub fn format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }
}
