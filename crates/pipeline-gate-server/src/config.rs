// crates/pipeline-gate-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: TOML-backed configuration with environment overrides.
// Purpose: Wire the workspace, store, bind address, and upload limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration loads from an optional TOML file (path in
//! `PIPELINE_GATE_CONFIG`, default `pipeline-gate.toml`), then applies
//! environment overrides. `PIPELINE_WORKSPACE` overrides the workspace root
//! regardless of the file. Every field has a usable default so the server
//! starts with no configuration at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "PIPELINE_GATE_CONFIG";

/// Environment variable overriding the workspace root.
pub const WORKSPACE_ENV: &str = "PIPELINE_WORKSPACE";

/// Default configuration file path.
const DEFAULT_CONFIG_PATH: &str = "pipeline-gate.toml";

/// Maximum files accepted per upload request.
pub const MAX_UPLOAD_FILES: usize = 10;

/// Maximum bytes accepted per uploaded file.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// MIME types accepted for uploaded documents.
pub const ALLOWED_MIME_TYPES: [&str; 8] = [
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/tiff",
    "text/plain",
    "text/csv",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config file read failure: {0}")]
    Io(String),
    /// Configuration file failed to parse.
    #[error("config parse failure: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Server configuration.
///
/// # Invariants
/// - `workspace` is the root of all run directories and uploads.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Workspace root directory.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path to the `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
        }
    }
}

/// Returns the default workspace root.
fn default_workspace() -> PathBuf {
    PathBuf::from("workspace")
}

/// Returns the default bind address.
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Returns the default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from("pipeline_gate.db")
}

impl ServerConfig {
    /// Loads configuration from the environment and optional TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a named file exists but cannot be read
    /// or parsed. A missing default file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(Path::new(&path))?
        } else if explicit.is_some() {
            return Err(ConfigError::Io(format!("config file not found: {path}")));
        } else {
            Self::default()
        };
        if let Ok(workspace) = std::env::var(WORKSPACE_ENV) {
            config.workspace = PathBuf::from(workspace);
        }
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.workspace, PathBuf::from("workspace"));
    }

    #[test]
    fn parses_partial_toml() {
        let config: ServerConfig =
            toml::from_str("bind_addr = \"0.0.0.0:9000\"").expect("parse");
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.store_path, PathBuf::from("pipeline_gate.db"));
    }
}
