//! Static configuration for the injected library.
//!
//! Read once at load time from `vrject.json` in the host's working
//! directory.
//! A missing file or missing fields fall back to defaults; the hook never
//! refuses to load over a bad config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default stereo separation in texture-space units.
pub const DEFAULT_SEPARATION: f32 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch; when false the library loads but installs nothing.
    pub enabled: bool,
    /// Initial stereo separation.
    pub separation: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            separation: DEFAULT_SEPARATION,
        }
    }
}

impl Config {
    /// Load from a JSON file. A missing file yields the defaults; a file
    /// that exists but does not parse is an error worth surfacing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(Error::config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.separation, DEFAULT_SEPARATION);
    }

    #[test]
    fn test_missing_file_is_default() {
        let cfg = Config::load("/nonexistent/vrject.json").unwrap();
        assert!(cfg.enabled);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.separation, DEFAULT_SEPARATION);
    }

    #[test]
    fn test_full_json() {
        let cfg: Config = serde_json::from_str(r#"{"enabled": true, "separation": 0.02}"#).unwrap();
        assert_eq!(cfg.separation, 0.02);
    }
}
