//! Discord-specific error types.

use rolesync_core::RoleSyncError;
use thiserror::Error;

/// Discord-specific errors.
#[derive(Error, Debug)]
pub enum DiscordError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Discord API returned an error
    #[error("Discord API error {code}: {message}")]
    Api { code: i32, message: String },

    /// Rate limited. Reported, never waited out.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: f64 },

    /// Generic gateway error
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<DiscordError> for RoleSyncError {
    fn from(err: DiscordError) -> Self {
        Self::Api(err.to_string())
    }
}

/// Result type for Discord operations.
pub type DiscordResult<T> = Result<T, DiscordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_discord_text() {
        let err: RoleSyncError = DiscordError::Api {
            code: 50013,
            message: "Missing Permissions".into(),
        }
        .into();
        assert_eq!(
            err,
            RoleSyncError::Api("Discord API error 50013: Missing Permissions".into())
        );
    }
}
