//! Centralized error types for the role sync workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to the failure classes the bot reports.
///
/// `Config` is fatal at startup. Everything else is recoverable at the
/// command level and ends up as a message to the invoking user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RoleSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("guild not found in config: {0}")]
    GuildNotConfigured(String),

    #[error("role not found in config: {0}")]
    RuleNotFound(String),

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// A remote call failed. Carries the platform's error text unmodified.
    #[error("{0}")]
    Api(String),
}

impl RoleSyncError {
    /// Lookup misses are answered with a message, not logged as failures.
    pub const fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::GuildNotConfigured(_) | Self::RuleNotFound(_) | Self::RoleNotFound(_)
        )
    }
}

pub type RoleSyncResult<T> = Result<T, RoleSyncError>;
