//! Bot configuration
//!
//! Loaded once at startup from a YAML file and shared behind an `Arc`. The
//! Discord token is read from the environment, never from the file.

use crate::notify::{DEFAULT_NOTIFY_DB, NotifyError, NotifyResult, OutputRule, RawId, load_rules};
use poise::serenity_prelude::RoleId;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Config file used when `MUTE_NOTIFIER_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MUTE_NOTIFIER_CONFIG";
/// Environment variable holding the bot token
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// Notify section of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNotifyConfig {
    /// Kept raw so one broken rule does not fail the whole file
    pub mutenotify_rules: Vec<serde_yaml::Value>,
}

/// Config file as written
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub prefix: String,
    #[serde(deserialize_with = "deserialize_ids")]
    pub listening_guilds: Vec<u64>,
    #[serde(deserialize_with = "deserialize_ids")]
    pub staff_roles: Vec<u64>,
    pub scan_interval_secs: u64,
    pub notify_db: PathBuf,
    pub notify: RawNotifyConfig,
}

/// Discord ids written either as numbers or as quoted strings
fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(|raw| {
            raw.value()
                .ok_or_else(|| serde::de::Error::custom(format!("invalid id '{raw}'")))
        })
        .collect()
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            listening_guilds: Vec::new(),
            staff_roles: Vec::new(),
            scan_interval_secs: 1,
            notify_db: PathBuf::from(DEFAULT_NOTIFY_DB),
            notify: RawNotifyConfig::default(),
        }
    }
}

/// Validated, immutable bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Prefix for text commands
    pub prefix: String,
    /// Guilds scanned by the periodic mute status check
    pub listening_guilds: Vec<u64>,
    /// Roles allowed to run staff commands
    pub staff_roles: Vec<u64>,
    pub scan_interval: Duration,
    /// Location of the watched-user store
    pub notify_db: PathBuf,
    pub rules: Vec<Arc<OutputRule>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl BotConfig {
    /// Build the config from its raw form. Invalid output rules are logged
    /// and dropped.
    #[must_use]
    pub fn from_raw(raw: RawConfig) -> Self {
        let rules = load_rules(&raw.notify.mutenotify_rules);
        Self {
            prefix: raw.prefix,
            listening_guilds: raw.listening_guilds,
            staff_roles: raw.staff_roles,
            // A zero interval would make tokio panic
            scan_interval: Duration::from_secs(raw.scan_interval_secs.max(1)),
            notify_db: raw.notify_db,
            rules,
        }
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::ConfigFile`] if the document is not valid YAML
    /// or has the wrong shape.
    pub fn from_yaml(yaml: &str) -> NotifyResult<Self> {
        let raw: RawConfig = if yaml.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| NotifyError::ConfigFile(e.to_string()))?
        };
        Ok(Self::from_raw(raw))
    }

    /// Load and validate the config file at `path`
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::ConfigFile`] if the file cannot be read or
    /// parsed.
    pub async fn load(path: impl AsRef<Path>) -> NotifyResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NotifyError::ConfigFile(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&content)?;
        info!(
            path = %path.display(),
            guilds = config.listening_guilds.len(),
            rules = config.rules.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Path of the config file, honouring `MUTE_NOTIFIER_CONFIG`
    #[must_use]
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
    }

    /// Whether any of `roles` is a staff role
    #[must_use]
    pub fn is_staff(&self, roles: &[RoleId]) -> bool {
        roles
            .iter()
            .any(|role| self.staff_roles.contains(&role.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
prefix: "?"
listening_guilds: [111, 222]
staff_roles: [900]
scan_interval_secs: 5
notify_db: data/test_db.yaml
notify:
  mutenotify_rules:
    - name: missing-id
      format: html
      file: out/a.html
      template: { muted: a, unmuted: b, unknown: c }
    - name: streamer
      format: html
      file: out/b.html
      id: 42
      template: { muted: a, unmuted: b, unknown: c }
"#;

    #[test]
    fn test_from_yaml() {
        let config = BotConfig::from_yaml(SAMPLE).expect("valid config");
        assert_eq!(config.prefix, "?");
        assert_eq!(config.listening_guilds, vec![111, 222]);
        assert_eq!(config.staff_roles, vec![900]);
        assert_eq!(config.scan_interval, Duration::from_secs(5));
        assert_eq!(config.notify_db, PathBuf::from("data/test_db.yaml"));
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "streamer");
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_yaml("").expect("empty config");
        assert_eq!(config.prefix, "!");
        assert!(config.listening_guilds.is_empty());
        assert_eq!(config.scan_interval, Duration::from_secs(1));
        assert_eq!(config.notify_db, PathBuf::from(DEFAULT_NOTIFY_DB));
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = BotConfig::from_yaml("scan_interval_secs: 0\n").unwrap();
        assert_eq!(config.scan_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = BotConfig::from_yaml("listening_guilds: not-a-list\n").unwrap_err();
        assert!(matches!(err, NotifyError::ConfigFile(_)));
    }

    #[test]
    fn test_quoted_ids() {
        let config = BotConfig::from_yaml(
            "listening_guilds: [\"123\", 124]\nstaff_roles: [\"456\"]\n",
        )
        .expect("quoted ids are accepted");
        assert_eq!(config.listening_guilds, vec![123, 124]);
        assert_eq!(config.staff_roles, vec![456]);
        assert!(config.is_staff(&[RoleId::new(456)]));

        let err = BotConfig::from_yaml("staff_roles: [\"staff\"]\n").unwrap_err();
        assert!(matches!(err, NotifyError::ConfigFile(ref message) if message.contains("invalid id 'staff'")));
    }

    #[test]
    fn test_is_staff() {
        let config = BotConfig::from_yaml("staff_roles: [900, 901]\n").unwrap();
        assert!(config.is_staff(&[RoleId::new(5), RoleId::new(901)]));
        assert!(!config.is_staff(&[RoleId::new(5)]));
        assert!(!config.is_staff(&[]));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = BotConfig::load(dir.path().join("nope.yaml")).await.unwrap_err();
        assert!(matches!(err, NotifyError::ConfigFile(_)));
    }
}
