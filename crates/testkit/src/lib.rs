//! In-memory guild for exercising the engine without a network.
//!
//! [`MockGuild`] implements both provider traits over a single guild. Writes
//! mutate the in-memory state, so running an operation twice observes the
//! first run's effects. Every call is recorded for assertions, and individual
//! calls can be made to fail with [`FailPoint`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolesync_core::{
    Channel, Member, PartialGuild, PermissionOverwrite, Permissions, RoleEdit, RoleSyncError,
    RoleSyncResult, Role, User,
};
use rolesync_provider::{
    CommandApi, CommandData, CommandDataOption, CommandSpec, GuildApi, Interaction,
    InteractionKind, InteractionResponse, RegisteredCommand, OPTION_STRING,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Every call the mock served, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GuildRoles,
    EditRole { role_id: String, edit: RoleEdit },
    GuildChannels,
    SetOverwrite { channel_id: String, overwrite: PermissionOverwrite },
    DeleteOverwrite { channel_id: String, subject_id: String },
    GuildMember { user_id: String },
    AddMemberRole { user_id: String, role_id: String },
    Respond(InteractionResponse),
    EditOriginal(String),
    CurrentUser,
    CurrentUserGuilds,
    GuildCommands,
    CreateCommand(CommandSpec),
    DeleteCommand { command_id: String },
}

impl Call {
    /// Calls that change guild state.
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::EditRole { .. }
                | Self::SetOverwrite { .. }
                | Self::DeleteOverwrite { .. }
                | Self::AddMemberRole { .. }
                | Self::CreateCommand(_)
                | Self::DeleteCommand { .. }
        )
    }
}

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    GuildRoles,
    EditRole,
    GuildChannels,
    /// Fail the n-th (0-based) channel overwrite write.
    ChannelWrite(usize),
    GuildMember,
    AddMemberRole,
    Respond,
    EditOriginal,
}

#[derive(Debug, Default)]
struct State {
    roles: Vec<Role>,
    channels: Vec<Channel>,
    members: HashMap<String, Member>,
    commands: Vec<RegisteredCommand>,
    next_command_id: u64,
    channel_writes: usize,
    failures: Vec<FailPoint>,
    calls: Vec<Call>,
}

pub struct MockGuild {
    guild_id: String,
    state: Mutex<State>,
}

impl MockGuild {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            state: Mutex::new(State {
                next_command_id: 1,
                ..State::default()
            }),
        }
    }

    pub fn with_role(self, role: Role) -> Self {
        self.lock().roles.push(role);
        self
    }

    pub fn with_channel(self, channel: Channel) -> Self {
        self.lock().channels.push(channel);
        self
    }

    pub fn with_member(self, user_id: impl Into<String>, member: Member) -> Self {
        self.lock().members.insert(user_id.into(), member);
        self
    }

    pub fn with_command(self, name: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            let id = state.next_command_id.to_string();
            state.next_command_id += 1;
            state.commands.push(RegisteredCommand {
                id,
                name: name.into(),
            });
        }
        self
    }

    pub fn fail_on(&self, point: FailPoint) {
        self.lock().failures.push(point);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn role(&self, role_id: &str) -> Option<Role> {
        self.lock().roles.iter().find(|r| r.id == role_id).cloned()
    }

    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.lock()
            .channels
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
    }

    pub fn member(&self, user_id: &str) -> Option<Member> {
        self.lock().members.get(user_id).cloned()
    }

    pub fn commands(&self) -> Vec<RegisteredCommand> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_guild(&self, guild_id: &str) -> RoleSyncResult<()> {
        if guild_id == self.guild_id {
            Ok(())
        } else {
            Err(RoleSyncError::Api("Discord API error 10004: Unknown Guild".into()))
        }
    }
}

impl State {
    fn take_failure(&mut self, point: FailPoint) -> RoleSyncResult<()> {
        if let Some(pos) = self.failures.iter().position(|f| *f == point) {
            self.failures.remove(pos);
            return Err(RoleSyncError::Api(format!("injected failure: {point:?}")));
        }
        Ok(())
    }

    fn channel_write(&mut self) -> RoleSyncResult<()> {
        let n = self.channel_writes;
        self.channel_writes += 1;
        self.take_failure(FailPoint::ChannelWrite(n))
    }

    fn channel_mut(&mut self, channel_id: &str) -> RoleSyncResult<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| RoleSyncError::Api("Discord API error 10003: Unknown Channel".into()))
    }
}

#[async_trait]
impl GuildApi for MockGuild {
    async fn guild_roles(&self, guild_id: &str) -> RoleSyncResult<Vec<Role>> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::GuildRoles);
        state.take_failure(FailPoint::GuildRoles)?;
        Ok(state.roles.clone())
    }

    async fn edit_role(
        &self,
        guild_id: &str,
        role_id: &str,
        edit: &RoleEdit,
    ) -> RoleSyncResult<()> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::EditRole {
            role_id: role_id.into(),
            edit: *edit,
        });
        state.take_failure(FailPoint::EditRole)?;
        let role = state
            .roles
            .iter_mut()
            .find(|r| r.id == role_id)
            .ok_or_else(|| RoleSyncError::Api("Discord API error 10011: Unknown Role".into()))?;
        role.permissions = edit.permissions;
        role.hoist = edit.hoist;
        role.mentionable = edit.mentionable;
        Ok(())
    }

    async fn guild_channels(&self, guild_id: &str) -> RoleSyncResult<Vec<Channel>> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::GuildChannels);
        state.take_failure(FailPoint::GuildChannels)?;
        Ok(state.channels.clone())
    }

    async fn set_channel_overwrite(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> RoleSyncResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::SetOverwrite {
            channel_id: channel_id.into(),
            overwrite: overwrite.clone(),
        });
        state.channel_write()?;
        let channel = state.channel_mut(channel_id)?;
        match channel
            .permission_overwrites
            .iter_mut()
            .find(|ow| ow.id == overwrite.id && ow.kind == overwrite.kind)
        {
            Some(existing) => *existing = overwrite.clone(),
            None => channel.permission_overwrites.push(overwrite.clone()),
        }
        Ok(())
    }

    async fn delete_channel_overwrite(
        &self,
        channel_id: &str,
        subject_id: &str,
    ) -> RoleSyncResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::DeleteOverwrite {
            channel_id: channel_id.into(),
            subject_id: subject_id.into(),
        });
        state.channel_write()?;
        let channel = state.channel_mut(channel_id)?;
        channel.permission_overwrites.retain(|ow| ow.id != subject_id);
        Ok(())
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> RoleSyncResult<Member> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::GuildMember {
            user_id: user_id.into(),
        });
        state.take_failure(FailPoint::GuildMember)?;
        state
            .members
            .get(user_id)
            .cloned()
            .ok_or_else(|| RoleSyncError::Api("Discord API error 10007: Unknown Member".into()))
    }

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> RoleSyncResult<()> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::AddMemberRole {
            user_id: user_id.into(),
            role_id: role_id.into(),
        });
        state.take_failure(FailPoint::AddMemberRole)?;
        let member = state
            .members
            .get_mut(user_id)
            .ok_or_else(|| RoleSyncError::Api("Discord API error 10007: Unknown Member".into()))?;
        if !member.has_role(role_id) {
            member.roles.push(role_id.into());
        }
        Ok(())
    }

    async fn respond(
        &self,
        _interaction: &Interaction,
        response: &InteractionResponse,
    ) -> RoleSyncResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::Respond(response.clone()));
        state.take_failure(FailPoint::Respond)
    }

    async fn edit_original_response(
        &self,
        _interaction: &Interaction,
        content: &str,
    ) -> RoleSyncResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::EditOriginal(content.into()));
        state.take_failure(FailPoint::EditOriginal)
    }
}

#[async_trait]
impl CommandApi for MockGuild {
    async fn current_user(&self) -> RoleSyncResult<User> {
        self.lock().calls.push(Call::CurrentUser);
        Ok(User {
            id: "app".into(),
            username: "rolesync".into(),
            discriminator: None,
            bot: true,
        })
    }

    async fn current_user_guilds(&self) -> RoleSyncResult<Vec<PartialGuild>> {
        self.lock().calls.push(Call::CurrentUserGuilds);
        Ok(vec![PartialGuild {
            id: self.guild_id.clone(),
            name: "Mock Guild".into(),
        }])
    }

    async fn guild_commands(
        &self,
        _application_id: &str,
        guild_id: &str,
    ) -> RoleSyncResult<Vec<RegisteredCommand>> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::GuildCommands);
        Ok(state.commands.clone())
    }

    async fn create_guild_command(
        &self,
        _application_id: &str,
        guild_id: &str,
        command: &CommandSpec,
    ) -> RoleSyncResult<RegisteredCommand> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::CreateCommand(command.clone()));
        let registered = RegisteredCommand {
            id: state.next_command_id.to_string(),
            name: command.name.clone(),
        };
        state.next_command_id += 1;
        state.commands.push(registered.clone());
        Ok(registered)
    }

    async fn delete_guild_command(
        &self,
        _application_id: &str,
        guild_id: &str,
        command_id: &str,
    ) -> RoleSyncResult<()> {
        self.check_guild(guild_id)?;
        let mut state = self.lock();
        state.calls.push(Call::DeleteCommand {
            command_id: command_id.into(),
        });
        state.commands.retain(|c| c.id != command_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

pub fn role(id: &str, name: &str, permissions: Permissions) -> Role {
    Role {
        id: id.into(),
        name: name.into(),
        permissions,
        hoist: false,
        mentionable: false,
    }
}

pub fn channel(id: &str, overwrites: Vec<PermissionOverwrite>) -> Channel {
    Channel {
        id: id.into(),
        kind: 0,
        name: Some(format!("channel-{id}")),
        permission_overwrites: overwrites,
    }
}

pub fn member(user_id: &str, roles: &[&str], joined_at: DateTime<Utc>) -> Member {
    Member {
        user: Some(User {
            id: user_id.into(),
            username: format!("user-{user_id}"),
            discriminator: None,
            bot: false,
        }),
        roles: roles.iter().map(|r| (*r).to_string()).collect(),
        joined_at,
    }
}

/// A string option as sent by the client.
pub fn option(name: &str, value: &str) -> CommandDataOption {
    CommandDataOption {
        name: name.into(),
        kind: OPTION_STRING,
        value: Some(serde_json::Value::String(value.into())),
        focused: false,
    }
}

/// The option being typed in during autocomplete.
pub fn focused(name: &str, value: &str) -> CommandDataOption {
    CommandDataOption {
        focused: true,
        ..option(name, value)
    }
}

/// An interaction in `guild_id`, invoked by `invoker` when given.
pub fn interaction(
    kind: InteractionKind,
    guild_id: &str,
    invoker: Option<Member>,
    command: &str,
    options: Vec<CommandDataOption>,
) -> Interaction {
    Interaction {
        id: "interaction".into(),
        application_id: "app".into(),
        kind,
        data: Some(CommandData {
            id: format!("cmd-{command}"),
            name: command.into(),
            options,
        }),
        guild_id: Some(guild_id.into()),
        member: invoker,
        token: "interaction-token".into(),
    }
}
