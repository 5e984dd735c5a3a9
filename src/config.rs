//! Sidecar configuration.
//!
//! Resolution order:
//! 1. explicit path (command-line argument)
//! 2. `QDASTORE_CONFIG` environment variable
//! 3. `<workspace>/qdastore.toml`
//! 4. built-in defaults

use crate::import::{AutoDecider, ImportOptions, TextCodec};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "QDASTORE_CONFIG";
pub const LOG_ENV: &str = "QDASTORE_LOG";
pub const WORKSPACE_CONFIG_FILE: &str = "qdastore.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub default_codec: TextCodec,
    pub legacy_codec: TextCodec,
    pub lock_owner: String,
    pub accept_recoverable_issues: bool,
    pub confirm_legacy_format: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        let options = ImportOptions::default();
        ImportSettings {
            default_codec: options.default_codec,
            legacy_codec: options.legacy_codec,
            lock_owner: options.lock_owner,
            accept_recoverable_issues: true,
            confirm_legacy_format: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub import: ImportSettings,
    pub log: LogSettings,
}

impl Config {
    pub fn from_toml(text: &str) -> anyhow::Result<Config> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads the first configuration found in resolution order. A missing
    /// workspace file falls through to defaults; an unreadable explicit or
    /// environment path is an error.
    pub fn resolve(explicit: Option<&Path>, workspace: Option<&Path>) -> anyhow::Result<Config> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Self::load_file(&PathBuf::from(path));
            }
        }
        if let Some(ws) = workspace {
            let path = ws.join(WORKSPACE_CONFIG_FILE);
            if path.is_file() {
                return Self::load_file(&path);
            }
        }
        Ok(Config::default())
    }

    /// Engine options; the lock owner gets a per-process suffix so two
    /// sidecars never share lock rows.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            default_codec: self.import.default_codec,
            legacy_codec: self.import.legacy_codec,
            codec_override: None,
            lock_owner: format!("{}:{}", self.import.lock_owner, std::process::id()),
        }
    }

    pub fn decider(&self) -> AutoDecider {
        AutoDecider {
            confirm_legacy: self.import.confirm_legacy_format,
            accept_issues: self.import.accept_recoverable_issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = Config::from_toml("").expect("parse");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.import.legacy_codec, TextCodec::Latin1);
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg = Config::from_toml(
            "[import]\nlegacy_codec = \"utf-8\"\naccept_recoverable_issues = false\n[log]\nfilter = \"qdastored=debug\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.import.legacy_codec, TextCodec::Utf8);
        assert_eq!(cfg.import.default_codec, TextCodec::Utf8);
        assert!(!cfg.decider().accept_issues);
        assert!(cfg.decider().confirm_legacy);
        assert_eq!(cfg.log.filter, "qdastored=debug");
    }

    #[test]
    fn unknown_codec_is_rejected() {
        assert!(Config::from_toml("[import]\ndefault_codec = \"ebcdic\"\n").is_err());
    }

    #[test]
    fn lock_owner_is_process_scoped() {
        let opts = Config::default().import_options();
        assert!(opts.lock_owner.starts_with("qdastored:"));
    }
}
