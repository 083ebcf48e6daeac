use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;
pub const DEFAULT_CONTROL_PORT: u16 = 7070;

/// The `adapter:` section of the deployment file. Every key is optional here;
/// `Settings::try_from` decides what is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub imp_address: Option<Ipv4Addr>,
    pub imp_port: Option<u16>,
    pub timeout: Option<f64>,
    pub interface: Option<String>,
    pub oracle_table: Option<PathBuf>,
    pub port: Option<u16>,
    pub translator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    adapter: AdapterConfig,
}

impl AdapterConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text).context("Invalid adapter configuration.")?;
        Ok(file.adapter)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).context(format!("Failed to read config {:?}.", path))?;
        Self::from_yaml(&text)
    }

    /// Values set in `overrides` win.
    pub fn merge(self, overrides: AdapterConfig) -> Self {
        Self {
            imp_address: overrides.imp_address.or(self.imp_address),
            imp_port: overrides.imp_port.or(self.imp_port),
            timeout: overrides.timeout.or(self.timeout),
            interface: overrides.interface.or(self.interface),
            oracle_table: overrides.oracle_table.or(self.oracle_table),
            port: overrides.port.or(self.port),
            translator: overrides.translator.or(self.translator),
        }
    }
}

/// Fully resolved configuration of one adapter process.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub imp_address: Ipv4Addr,
    pub imp_port: u16,
    pub timeout: Duration,
    pub interface: String,
    pub oracle_table: Option<PathBuf>,
    pub port: u16,
    pub translator: String,
}

impl TryFrom<AdapterConfig> for Settings {
    type Error = anyhow::Error;

    fn try_from(config: AdapterConfig) -> Result<Self> {
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        anyhow::ensure!(
            timeout.is_finite() && timeout > 0.0,
            "timeout must be a positive number of seconds, got {}",
            timeout
        );

        Ok(Self {
            imp_address: config.imp_address.context("impAddress is not configured.")?,
            imp_port: config.imp_port.context("impPort is not configured.")?,
            timeout: Duration::from_secs_f64(timeout),
            interface: config.interface.context("interface is not configured.")?,
            oracle_table: config.oracle_table,
            port: config.port.unwrap_or(DEFAULT_CONTROL_PORT),
            translator: config.translator.context("translator is not configured.")?,
        })
    }
}
