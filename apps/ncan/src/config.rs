use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Nuttx,
    Mock,
}

/// Defaults for the device flags, optionally read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: String,
    pub backend: Backend,
    /// Milliseconds; negative waits forever.
    pub timeout_ms: i32,
    /// Kernel built with CONFIG_CAN_ERRORS (shifts the extended-id bit).
    pub kernel_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/can0".to_string(),
            backend: Backend::Nuttx,
            timeout_ms: 500,
            kernel_errors: false,
        }
    }
}

impl Config {
    /// Read `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) if Path::new(p).exists() => {
                let contents = fs::read_to_string(p)?;
                Ok(serde_json::from_str(&contents)?)
            }
            Some(p) => {
                tracing::debug!(path = p, "config file missing, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}
