//! TOML configuration file support for the transfer commands.
//!
//! Instead of relying on the built-in field lists, users can specify them in a
//! config file:
//!
//! ```toml
//! # particle-bridge.toml
//! [transfer]
//! fields = ["_rlnAngleRot", "_rlnAngleTilt", "_rlnAnglePsi"]
//! skip_fields = ["_rlnRandomSubset"]
//! src_rule = { strip_uid = true, strip_ext = true }
//! dest_rule = { strip_ext = true }
//! ```
//!
//! Settings left out keep the command's defaults.

use anyhow::{Context, Result};
use particle_bridge::identity::IdentityRule;
use particle_bridge::merge::MergeConfig;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure for particle-bridge.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Transfer-specific settings.
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Overrides for the transfer commands.
#[derive(Debug, Default, Deserialize)]
pub struct TransferConfig {
    /// Fields to copy, replacing the command's list.
    pub fields: Option<Vec<String>>,

    /// Fields never copied.
    pub skip_fields: Option<Vec<String>>,

    /// Identity normalization of destination rows.
    pub dest_rule: Option<IdentityRule>,

    /// Identity normalization of source rows.
    pub src_rule: Option<IdentityRule>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

impl TransferConfig {
    /// Apply the overrides on top of a command's defaults.
    pub fn apply(self, mut base: MergeConfig) -> MergeConfig {
        if let Some(fields) = self.fields {
            base.fields = fields;
        }
        if let Some(skip) = self.skip_fields {
            base.skip_fields = skip;
        }
        if let Some(rule) = self.dest_rule {
            base.dest_rule = rule;
        }
        if let Some(rule) = self.src_rule {
            base.src_rule = rule;
        }
        base
    }
}

/// The command's defaults, overridden by `config` when given.
pub fn merge_config(base: MergeConfig, config: Option<&Path>) -> Result<MergeConfig> {
    match config {
        Some(path) => Ok(Config::from_file(path)?.transfer.apply(base)),
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [transfer]
            fields = ["_rlnAngleRot", "_rlnAnglePsi"]
            skip_fields = ["_rlnAnglePsi"]
            src_rule = { strip_uid = true, strip_ext = true }
        "#;

        let config = Config::from_str(toml).unwrap();
        let merged = config.transfer.apply(MergeConfig::pose_transfer(true));
        assert_eq!(merged.requested_fields(), vec!["_rlnAngleRot"]);
        assert_eq!(merged.src_rule, IdentityRule::BASENAME);
        assert_eq!(merged.dest_rule, IdentityRule::EXACT);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let toml = r#"
            [transfer]
            dest_rule = { strip_ext = true }
        "#;

        let config = Config::from_str(toml).unwrap();
        let merged = config.transfer.apply(MergeConfig::group_transfer());
        assert_eq!(merged.fields, MergeConfig::group_transfer().fields);
        assert_eq!(merged.dest_rule, IdentityRule::new(false, true));
    }

    #[test]
    fn test_empty_config() {
        let config = Config::from_str("").unwrap();
        assert!(config.transfer.fields.is_none());
    }

    #[test]
    fn test_unreadable_config() {
        let err = merge_config(MergeConfig::default(), Some(Path::new("/nonexistent/particle-bridge.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
