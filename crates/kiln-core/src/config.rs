use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{IrError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Target triple; `None` selects the host.
    pub target: Option<String>,
    pub opt_level: OptLevel,
    pub enable_verifier: bool,
    /// Open the running process image so generated code can call host symbols.
    pub load_process_symbols: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            target: None,
            opt_level: OptLevel::Speed,
            enable_verifier: true,
            load_process_symbols: true,
        }
    }
}

impl JitConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| IrError::ConfigError(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IrError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| IrError::ConfigError(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting.
    pub fn as_setting(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}
