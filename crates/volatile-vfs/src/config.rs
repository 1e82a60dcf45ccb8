//! Registration options for a volatile file system.

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Maximum pathname length reported to the engine by default.
pub const DEFAULT_MAX_PATHNAME: i32 = 512;

/// Options applied when registering a volatile file system with the engine.
///
/// ```toml
/// max_pathname = 1024
/// make_default = false
/// sector_size = 4096
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatileConfig {
    /// Longest pathname the engine may pass to this VFS.
    pub max_pathname: i32,

    /// Register as the engine's default VFS.
    pub make_default: bool,

    /// Sector size reported for every file (0 lets the engine pick).
    pub sector_size: i32,
}

impl Default for VolatileConfig {
    fn default() -> Self {
        Self {
            max_pathname: DEFAULT_MAX_PATHNAME,
            make_default: false,
            sector_size: 0,
        }
    }
}

impl VolatileConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> VfsResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| VfsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum pathname length.
    pub fn with_max_pathname(mut self, max_pathname: i32) -> Self {
        self.max_pathname = max_pathname;
        self
    }

    /// Register as the default VFS.
    pub fn with_make_default(mut self, make_default: bool) -> Self {
        self.make_default = make_default;
        self
    }

    /// Set the reported sector size.
    pub fn with_sector_size(mut self, sector_size: i32) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn validate(&self) -> VfsResult<()> {
        if self.max_pathname <= 0 {
            return Err(VfsError::InvalidConfig(format!(
                "max_pathname must be positive, got {}",
                self.max_pathname
            )));
        }
        if self.sector_size < 0 {
            return Err(VfsError::InvalidConfig(format!(
                "sector_size must not be negative, got {}",
                self.sector_size
            )));
        }
        Ok(())
    }
}
