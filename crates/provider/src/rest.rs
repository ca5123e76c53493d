//! Discord REST API client.
//!
//! One request per call: no retries and no rate-limit queueing. A 429 comes
//! back as [`DiscordError::RateLimited`] and fails the command like any other
//! remote error.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use rolesync_core::{
    Channel, DiscordSettings, Member, PartialGuild, PermissionOverwrite, RoleEdit,
    RoleSyncResult, Role, User,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{DiscordError, DiscordResult};
use crate::interaction::{CommandSpec, Interaction, InteractionResponse, RegisteredCommand};
use crate::{CommandApi, GuildApi};

/// Max guilds returned by one `/users/@me/guilds` page.
const GUILD_PAGE_LIMIT: u32 = 200;

/// Discord REST API client.
#[derive(Clone)]
pub struct DiscordRestClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl fmt::Debug for DiscordRestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordRestClient")
            .field("base_url", &self.base_url)
            .field("bot_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DiscordRestClient {
    /// Create a new API client from configuration.
    pub fn new(settings: &DiscordSettings) -> DiscordResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(format!(
                "DiscordBot (https://github.com/rolesync/rolesync, {})",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            bot_token: normalize_token(&settings.token).to_string(),
        })
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    /// Gateway websocket URL for this bot.
    pub async fn gateway_url(&self) -> DiscordResult<String> {
        #[derive(Deserialize)]
        struct GatewayResponse {
            url: String,
        }

        let resp: GatewayResponse = self.get("/gateway/bot").await?;
        Ok(resp.url)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> DiscordResult<T> {
        let response = self.send(Method::GET, endpoint, None::<&()>).await?;
        decode(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> DiscordResult<T> {
        let response = self.send(method, endpoint, Some(body)).await?;
        decode(response).await
    }

    /// For endpoints answering `204 No Content`.
    async fn send_empty<B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> DiscordResult<()> {
        let response = self.send(method, endpoint, body).await?;
        check_status(response).await.map(drop)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> DiscordResult<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%method, endpoint, "Making Discord API request");

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.bot_token));
        if let Some(b) = body {
            req = req.json(b);
        }

        Ok(req.send().await?)
    }
}

fn normalize_token(token: &str) -> &str {
    let token = token.trim();
    token.strip_prefix("Bot ").unwrap_or(token)
}

async fn decode<T: DeserializeOwned>(response: Response) -> DiscordResult<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(DiscordError::from)
}

/// Turns non-success statuses into [`DiscordError`]s.
async fn check_status(response: Response) -> DiscordResult<Response> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        return Err(DiscordError::RateLimited { retry_after });
    }

    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await?;
    Err(api_error(status, &bytes))
}

fn api_error(status: StatusCode, body: &[u8]) -> DiscordError {
    #[derive(Deserialize)]
    struct DiscordApiError {
        code: Option<i32>,
        message: Option<String>,
    }

    let fallback_code = i32::from(status.as_u16());
    match serde_json::from_slice::<DiscordApiError>(body) {
        Ok(error) => DiscordError::Api {
            code: error.code.unwrap_or(fallback_code),
            message: error.message.unwrap_or_else(|| "Unknown error".into()),
        },
        Err(_) => DiscordError::Api {
            code: fallback_code,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[derive(Serialize)]
struct OverwriteBody {
    allow: rolesync_core::Permissions,
    deny: rolesync_core::Permissions,
    #[serde(rename = "type")]
    kind: rolesync_core::OverwriteKind,
}

#[derive(Serialize)]
struct MessageEdit<'a> {
    content: &'a str,
}

#[async_trait]
impl GuildApi for DiscordRestClient {
    #[instrument(skip(self))]
    async fn guild_roles(&self, guild_id: &str) -> RoleSyncResult<Vec<Role>> {
        Ok(self.get(&format!("/guilds/{guild_id}/roles")).await?)
    }

    #[instrument(skip(self, edit))]
    async fn edit_role(
        &self,
        guild_id: &str,
        role_id: &str,
        edit: &RoleEdit,
    ) -> RoleSyncResult<()> {
        let _: serde::de::IgnoredAny = self
            .send_json(
                Method::PATCH,
                &format!("/guilds/{guild_id}/roles/{role_id}"),
                edit,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn guild_channels(&self, guild_id: &str) -> RoleSyncResult<Vec<Channel>> {
        Ok(self.get(&format!("/guilds/{guild_id}/channels")).await?)
    }

    #[instrument(skip(self, overwrite), fields(subject = %overwrite.id))]
    async fn set_channel_overwrite(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> RoleSyncResult<()> {
        let body = OverwriteBody {
            allow: overwrite.allow,
            deny: overwrite.deny,
            kind: overwrite.kind,
        };
        self.send_empty(
            Method::PUT,
            &format!("/channels/{channel_id}/permissions/{}", overwrite.id),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_channel_overwrite(
        &self,
        channel_id: &str,
        subject_id: &str,
    ) -> RoleSyncResult<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/channels/{channel_id}/permissions/{subject_id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn guild_member(&self, guild_id: &str, user_id: &str) -> RoleSyncResult<Member> {
        Ok(self
            .get(&format!("/guilds/{guild_id}/members/{user_id}"))
            .await?)
    }

    #[instrument(skip(self))]
    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> RoleSyncResult<()> {
        self.send_empty(
            Method::PUT,
            &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(interaction_id = %interaction.id))]
    async fn respond(
        &self,
        interaction: &Interaction,
        response: &InteractionResponse,
    ) -> RoleSyncResult<()> {
        self.send_empty(
            Method::POST,
            &format!(
                "/interactions/{}/{}/callback",
                interaction.id, interaction.token
            ),
            Some(response),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(interaction_id = %interaction.id))]
    async fn edit_original_response(
        &self,
        interaction: &Interaction,
        content: &str,
    ) -> RoleSyncResult<()> {
        self.send_empty(
            Method::PATCH,
            &format!(
                "/webhooks/{}/{}/messages/@original",
                interaction.application_id, interaction.token
            ),
            Some(&MessageEdit { content }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandApi for DiscordRestClient {
    async fn current_user(&self) -> RoleSyncResult<User> {
        Ok(self.get("/users/@me").await?)
    }

    async fn current_user_guilds(&self) -> RoleSyncResult<Vec<PartialGuild>> {
        Ok(self
            .get(&format!("/users/@me/guilds?limit={GUILD_PAGE_LIMIT}"))
            .await?)
    }

    async fn guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
    ) -> RoleSyncResult<Vec<RegisteredCommand>> {
        Ok(self
            .get(&format!(
                "/applications/{application_id}/guilds/{guild_id}/commands"
            ))
            .await?)
    }

    #[instrument(skip(self, command), fields(command = %command.name))]
    async fn create_guild_command(
        &self,
        application_id: &str,
        guild_id: &str,
        command: &CommandSpec,
    ) -> RoleSyncResult<RegisteredCommand> {
        Ok(self
            .send_json(
                Method::POST,
                &format!("/applications/{application_id}/guilds/{guild_id}/commands"),
                command,
            )
            .await?)
    }

    #[instrument(skip(self))]
    async fn delete_guild_command(
        &self,
        application_id: &str,
        guild_id: &str,
        command_id: &str,
    ) -> RoleSyncResult<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/applications/{application_id}/guilds/{guild_id}/commands/{command_id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_prefix_is_stripped() {
        assert_eq!(normalize_token("Bot abc"), "abc");
        assert_eq!(normalize_token("  abc \n"), "abc");
    }

    #[test]
    fn api_error_prefers_discord_body() {
        let err = api_error(
            StatusCode::FORBIDDEN,
            br#"{"code": 50013, "message": "Missing Permissions"}"#,
        );
        assert_eq!(err.to_string(), "Discord API error 50013: Missing Permissions");
    }

    #[test]
    fn api_error_falls_back_to_raw_body() {
        let err = api_error(StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(err.to_string(), "Discord API error 502: upstream down");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let mut settings: DiscordSettings =
            settings_from_yaml("token: \"Bot xyz\"\napi_url: \"http://localhost:9/api/\"");
        settings.request_timeout_secs = 5;
        let client = DiscordRestClient::new(&settings).unwrap();
        assert_eq!(client.base_url, "http://localhost:9/api");
        assert_eq!(client.bot_token(), "xyz");
    }

    #[test]
    fn debug_output_hides_token() {
        let settings = settings_from_yaml("token: \"Bot secret.token\"");
        let client = DiscordRestClient::new(&settings).unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret.token"), "{rendered}");
        assert!(rendered.contains("https://discord.com/api/v10"));
    }

    fn settings_from_yaml(body: &str) -> DiscordSettings {
        let raw = format!(
            "discord:\n{}",
            body.lines()
                .map(|l| format!("  {l}\n"))
                .collect::<String>()
        );
        rolesync_core::Config::from_yaml(&raw).unwrap().discord
    }
}
