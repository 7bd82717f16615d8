//! Code-generation configuration.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Instruction set a stub set is generated for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TargetArch {
    #[default]
    X86_64,
    Aarch64,
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetArch::X86_64 => write!(f, "x86_64"),
            TargetArch::Aarch64 => write!(f, "aarch64"),
        }
    }
}

/// Options for trampoline generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    pub arch: TargetArch,
    /// Log each generated stub's offset and size to stderr.
    pub trace_stubs: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            arch: TargetArch::default(),
            trace_stubs: false,
        }
    }
}

impl CodegenConfig {
    pub fn load(path: &Path) -> Result<CodegenConfig, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {}", e))?;
        fs::write(path, content).map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }
}
