//! Configuration for the ticket relations plugin.
//!
//! The configuration lives in a YAML file next to the tracker database. It
//! carries the plugin's own options and the `ticket-custom` registry that the
//! schema participant fills in with the `parents` and `refs` fields.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "ticketrels.yaml";

/// Default list of statuses that count as "done".
pub const DEFAULT_RESTRICTED_STATUS: &[&str] = &["closed"];

/// Default commit/comment keywords that introduce ticket mentions.
pub const DEFAULT_MENTION_COMMANDS: &[&str] = &[
    "close",
    "closed",
    "closes",
    "fix",
    "fixed",
    "fixes",
    "addresses",
    "re",
    "references",
    "refs",
    "see",
];

/// Plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RelationsConfig {
    /// Child statuses which allow closing the parent ticket; a parent in one
    /// of these statuses cannot receive open children.
    #[serde(default = "default_restricted_status")]
    pub restricted_status: Vec<String>,

    /// Keywords that introduce ticket mentions in descriptions and comments
    #[serde(default = "default_mention_commands")]
    pub mention_commands: Vec<String>,

    /// Path prefix prepended to generated links (e.g. `/trac`)
    #[serde(default)]
    pub base_path: String,

    /// Custom ticket fields registered with the tracker
    #[serde(default)]
    pub ticket_custom: BTreeMap<String, CustomField>,
}

/// A custom ticket field declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomField {
    /// Field widget type (`text`, `select`, ...)
    #[serde(rename = "type")]
    pub field_type: String,

    /// Label shown in the ticket form
    pub label: String,
}

impl CustomField {
    /// A free-text custom field.
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            field_type: "text".to_string(),
            label: label.into(),
        }
    }
}

fn default_restricted_status() -> Vec<String> {
    DEFAULT_RESTRICTED_STATUS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_mention_commands() -> Vec<String> {
    DEFAULT_MENTION_COMMANDS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl RelationsConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid YAML for this structure.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Same as [`RelationsConfig::load`] for files that exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on serialization failure and `Error::Io` when
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check option values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when `restricted-status` is empty or a
    /// base path does not start with `/`.
    pub fn validate(&self) -> Result<()> {
        if self.restricted_status.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Config(
                "restricted-status must name at least one status".to_string(),
            ));
        }
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(Error::Config(format!(
                "base-path must start with '/', got '{}'",
                self.base_path
            )));
        }
        Ok(())
    }

    /// Returns `true` if `status` is one of the restricted statuses.
    #[must_use]
    pub fn is_restricted(&self, status: &str) -> bool {
        self.restricted_status.iter().any(|s| s == status)
    }

    /// The status word used in "has not been ... yet" messages.
    #[must_use]
    pub fn done_status(&self) -> &str {
        self.restricted_status
            .first()
            .map_or("closed", String::as_str)
    }

    /// Returns `true` if a custom field named `name` is registered.
    #[must_use]
    pub fn has_custom_field(&self, name: &str) -> bool {
        self.ticket_custom.contains_key(name)
    }

    /// Label of a custom field, falling back to its name.
    #[must_use]
    pub fn field_label<'a>(&'a self, name: &'a str) -> &'a str {
        self.ticket_custom
            .get(name)
            .map_or(name, |field| field.label.as_str())
    }
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            restricted_status: default_restricted_status(),
            mention_commands: default_mention_commands(),
            base_path: String::new(),
            ticket_custom: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_restrict_closed_only() {
        let config = RelationsConfig::default();

        assert!(config.is_restricted("closed"));
        assert!(!config.is_restricted("new"));
        assert_eq!(config.done_status(), "closed");
        assert!(config.mention_commands.iter().any(|c| c == "refs"));
    }

    #[test]
    fn save_and_load_preserve_custom_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = RelationsConfig::default();
        config
            .ticket_custom
            .insert("parents".to_string(), CustomField::text("Parent Tickets"));
        config.save(&path).unwrap();

        let loaded = RelationsConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.field_label("parents"), "Parent Tickets");
        assert_eq!(loaded.field_label("refs"), "refs");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "restricted-status:\n  - closed\n  - rejected\n").unwrap();

        let config = RelationsConfig::load(&path).unwrap();
        assert!(config.is_restricted("rejected"));
        assert!(config.ticket_custom.is_empty());
        assert_eq!(config.mention_commands, default_mention_commands());
    }

    #[test]
    fn empty_restricted_status_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "restricted-status: []\n").unwrap();

        let err = RelationsConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("restricted-status"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RelationsConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, RelationsConfig::default());
    }
}
