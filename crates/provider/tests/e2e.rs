//! E2E tests against the live Discord API -- require a bot token.
//!
//! Run: `DISCORD_TOKEN=... cargo test -p rolesync-provider -- --ignored`
//! Set `DISCORD_GUILD_ID` to also read one guild's roles and channels.

use rolesync_core::config::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use rolesync_core::{AutoRoleTable, DiscordSettings};
use rolesync_provider::{CommandApi, DiscordRestClient, GuildApi};

fn live_client() -> DiscordRestClient {
    let token = std::env::var("DISCORD_TOKEN").expect("Set DISCORD_TOKEN to run E2E tests");
    DiscordRestClient::new(&DiscordSettings {
        token,
        api_url: DEFAULT_API_URL.into(),
        request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        auto_roles: AutoRoleTable::default(),
    })
    .expect("Failed to build client")
}

#[tokio::test]
#[ignore]
async fn current_user_and_guilds() {
    let client = live_client();

    let user = client.current_user().await.expect("Failed to fetch current user");
    assert!(user.bot, "Token should belong to a bot account");

    let guilds = client
        .current_user_guilds()
        .await
        .expect("Failed to list guilds");
    eprintln!("[e2e] {} is in {} guild(s)", user.username, guilds.len());

    let gateway = client.gateway_url().await.expect("Failed to fetch gateway URL");
    assert!(gateway.starts_with("wss://"));
}

#[tokio::test]
#[ignore]
async fn read_guild_roles_and_channels() {
    let Ok(guild_id) = std::env::var("DISCORD_GUILD_ID") else {
        eprintln!("[e2e] DISCORD_GUILD_ID not set, skipping");
        return;
    };
    let client = live_client();

    let roles = client.guild_roles(&guild_id).await.expect("Failed to list roles");
    assert!(
        roles.iter().any(|r| r.id == guild_id),
        "The @everyone role shares the guild id"
    );

    let channels = client
        .guild_channels(&guild_id)
        .await
        .expect("Failed to list channels");
    let overwrites: usize = channels.iter().map(|c| c.permission_overwrites.len()).sum();
    eprintln!(
        "[e2e] {} roles, {} channels, {} overwrites",
        roles.len(),
        channels.len(),
        overwrites
    );
}
