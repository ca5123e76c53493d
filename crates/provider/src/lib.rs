//! Discord platform access for the role sync bot.
//!
//! The engine only sees the [`GuildApi`] and [`CommandApi`] traits; the
//! [`rest::DiscordRestClient`] implements both over HTTP and the
//! [`gateway`] module delivers inbound interactions.

pub mod error;
pub mod gateway;
pub mod interaction;
pub mod rest;

use async_trait::async_trait;
use rolesync_core::{
    Channel, Member, PartialGuild, PermissionOverwrite, RoleEdit, RoleSyncResult, Role, User,
};

pub use error::{DiscordError, DiscordResult};
pub use gateway::{Gateway, GatewayEvent};
pub use interaction::{
    CommandChoice, CommandData, CommandDataOption, CommandOptionSpec, CommandSpec, Interaction,
    InteractionKind, InteractionResponse, RegisteredCommand, OPTION_STRING,
};
pub use rest::DiscordRestClient;

/// Guild state reads and the mutations the bot performs while handling a
/// command. Every call is a fresh remote round trip.
#[async_trait]
pub trait GuildApi: Send + Sync {
    /// All roles of the guild, in platform order.
    async fn guild_roles(&self, guild_id: &str) -> RoleSyncResult<Vec<Role>>;

    async fn edit_role(&self, guild_id: &str, role_id: &str, edit: &RoleEdit)
        -> RoleSyncResult<()>;

    async fn guild_channels(&self, guild_id: &str) -> RoleSyncResult<Vec<Channel>>;

    /// Creates or replaces the overwrite for `overwrite.id` on the channel.
    async fn set_channel_overwrite(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> RoleSyncResult<()>;

    async fn delete_channel_overwrite(&self, channel_id: &str, subject_id: &str)
        -> RoleSyncResult<()>;

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> RoleSyncResult<Member>;

    async fn add_member_role(&self, guild_id: &str, user_id: &str, role_id: &str)
        -> RoleSyncResult<()>;

    async fn respond(
        &self,
        interaction: &Interaction,
        response: &InteractionResponse,
    ) -> RoleSyncResult<()>;

    /// Replaces the content of a deferred response.
    async fn edit_original_response(&self, interaction: &Interaction, content: &str)
        -> RoleSyncResult<()>;
}

/// Guild command management, used once at startup.
#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn current_user(&self) -> RoleSyncResult<User>;

    async fn current_user_guilds(&self) -> RoleSyncResult<Vec<PartialGuild>>;

    async fn guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
    ) -> RoleSyncResult<Vec<RegisteredCommand>>;

    async fn create_guild_command(
        &self,
        application_id: &str,
        guild_id: &str,
        command: &CommandSpec,
    ) -> RoleSyncResult<RegisteredCommand>;

    async fn delete_guild_command(
        &self,
        application_id: &str,
        guild_id: &str,
        command_id: &str,
    ) -> RoleSyncResult<()>;
}
