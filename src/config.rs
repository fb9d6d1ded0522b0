//! Configuration for the tapefile tool
//!
//! Loaded from a JSON file, by default `<config dir>/tapefile/config.json`.
//! Every field is optional; missing fields take their default value.

use crate::drive::DeviceInfo;
use crate::error::{Result, TapeFileError};
use crate::session::SiteIdentity;
use crate::utils::short_upper_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "tapefile";
const CONFIG_FILE: &str = "config.json";
const RESOLV_CONF: &str = "/etc/resolv.conf";
const HOSTNAME_FILE: &str = "/etc/hostname";
const UNKNOWN: &str = "UNKNOWN";

/// Default payload block size, 256 KiB
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapeConfig {
    /// Check logical block protection on volumes that carry it
    pub use_lbp: bool,
    /// Mark written files as compressed in HDR2
    pub compression: bool,
    pub block_size: usize,
    /// Site name stamped in user labels; detected when absent
    pub site_name: Option<String>,
    /// Mover host name stamped in user labels; detected when absent
    pub host_name: Option<String>,
    /// Identity reported by the emulated drive
    pub drive: DeviceInfo,
    pub load_timeout_secs: u64,
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            use_lbp: true,
            compression: false,
            block_size: DEFAULT_BLOCK_SIZE,
            site_name: None,
            host_name: None,
            drive: DeviceInfo {
                vendor: "VIRTUAL".to_string(),
                product: "VDRIVE".to_string(),
                product_revision: "0001".to_string(),
                serial_number: "VD0000000001".to_string(),
                supports_lbp: true,
            },
            load_timeout_secs: 300,
        }
    }
}

impl TapeConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file gives the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapeFileError::config(format!("Cannot read configuration {:?}: {}", path, e))
        })?;
        let config = serde_json::from_str(&content).map_err(|e| {
            TapeFileError::config(format!("Invalid configuration {:?}: {}", path, e))
        })?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(TapeFileError::config("block_size must be greater than 0"));
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    /// Site and host identity, falling back to the system's own names.
    pub fn site_identity(&self) -> SiteIdentity {
        let site_name = match &self.site_name {
            Some(name) if !name.trim().is_empty() => short_upper_name(name),
            _ => detect_site_name(),
        };
        let host_name = match &self.host_name {
            Some(name) if !name.trim().is_empty() => short_upper_name(name),
            _ => detect_host_name(),
        };
        SiteIdentity::new(site_name, host_name)
    }
}

/// First label of the resolver's search domain, e.g. "CERN" for
/// `search cern.ch`.
pub fn detect_site_name() -> String {
    std::fs::read_to_string(RESOLV_CONF)
        .ok()
        .and_then(|content| site_from_resolv_conf(&content))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn detect_host_name() -> String {
    std::fs::read_to_string(HOSTNAME_FILE)
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|name| short_upper_name(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn site_from_resolv_conf(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("search "))
        .map(short_upper_name)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_site_from_resolv_conf() {
        let content = "# generated\nnameserver 10.0.0.1\nsearch cern.ch other.org\n";
        assert_eq!(site_from_resolv_conf(content), Some("CERN".to_string()));
        assert_eq!(site_from_resolv_conf("nameserver 10.0.0.1\n"), None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "use_lbp": false, "site_name": "cern.ch", "host_name": "tpsrv01.cern.ch" }}"#
        )
        .unwrap();

        let config = TapeConfig::load(Some(file.path())).unwrap();
        assert!(!config.use_lbp);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(
            config.site_identity(),
            SiteIdentity::new("CERN", "TPSRV01")
        );
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TapeConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, TapeFileError::Config(_)));
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "block_size": 0 }}"#).unwrap();
        assert!(TapeConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_detected_identity_is_never_empty() {
        let identity = TapeConfig::default().site_identity();
        assert!(!identity.site_name.is_empty());
        assert!(!identity.host_name.is_empty());
    }
}
