//! Bot configuration, loaded once from YAML and immutable afterwards.

use crate::error::{RoleSyncError, RoleSyncResult};
use crate::tenure::parse_duration;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_LOG_PATH: &str = "storage/log.txt";
pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Bot token. A leading `"Bot "` prefix is tolerated.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub auto_roles: AutoRoleTable,
}

impl fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("auto_roles", &self.auto_roles)
            .finish()
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> RoleSyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RoleSyncError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> RoleSyncResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| RoleSyncError::Config(e.to_string()))
    }

    /// Startup checks. Tenure strings are deliberately not checked here.
    pub fn validate(&self) -> RoleSyncResult<()> {
        if self.discord.token.trim().is_empty() {
            return Err(RoleSyncError::Config("discord.token must not be empty".into()));
        }
        if self.discord.request_timeout_secs == 0 {
            return Err(RoleSyncError::Config(
                "discord.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Auto-role rules
// ---------------------------------------------------------------------------

/// Self-service role grant rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRoleRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Minimum time since joining the guild. Empty means no condition.
    #[serde(default)]
    pub age_on_server: String,
}

impl RuleCondition {
    /// `None` when there is no condition; parse errors surface here, at
    /// evaluation time, not at load time.
    pub fn min_tenure(&self) -> RoleSyncResult<Option<Duration>> {
        if self.age_on_server.is_empty() {
            return Ok(None);
        }
        parse_duration(&self.age_on_server).map(Some)
    }
}

/// Per-guild rule lists, keyed by guild id.
///
/// A guild missing from the table and a guild listed with zero rules are
/// different states and are reported differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutoRoleTable {
    guilds: HashMap<String, Vec<AutoRoleRule>>,
}

impl AutoRoleTable {
    pub fn new(guilds: HashMap<String, Vec<AutoRoleRule>>) -> Self {
        Self { guilds }
    }

    /// Rules for `guild_id` in configured order, or `None` if the guild is
    /// not configured at all.
    pub fn guild(&self, guild_id: &str) -> Option<&[AutoRoleRule]> {
        self.guilds.get(guild_id).map(Vec::as_slice)
    }

    /// Looks up the rule for `(guild_id, role_id)`. The first match wins if a
    /// role is listed twice.
    pub fn rule(&self, guild_id: &str, role_id: &str) -> RoleSyncResult<&AutoRoleRule> {
        let rules = self
            .guild(guild_id)
            .ok_or_else(|| RoleSyncError::GuildNotConfigured(guild_id.to_string()))?;
        rules
            .iter()
            .find(|rule| rule.id == role_id)
            .ok_or_else(|| RoleSyncError::RuleNotFound(role_id.to_string()))
    }

    pub fn guilds(&self) -> impl Iterator<Item = (&str, &[AutoRoleRule])> {
        self.guilds
            .iter()
            .map(|(id, rules)| (id.as_str(), rules.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}
