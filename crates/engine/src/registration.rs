//! Slash command registration, run once at startup.

use rolesync_core::{AutoRoleRule, AutoRoleTable, Permissions, RoleSyncResult};
use rolesync_provider::{CommandApi, CommandChoice, CommandOptionSpec, CommandSpec, OPTION_STRING};
use tracing::{info, instrument, warn};

use crate::autocomplete::MAX_CHOICES;
use crate::dispatch::{AUTO_ROLE_COMMAND, OPTION_ORIGIN, OPTION_ROLE, OPTION_TARGET, ROLE_SYNC_COMMAND};

/// Counts from one registration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub guilds: usize,
    pub removed: usize,
    pub created: usize,
}

fn string_option(name: &str, description: &str) -> CommandOptionSpec {
    CommandOptionSpec {
        kind: OPTION_STRING,
        name: name.into(),
        description: description.into(),
        required: true,
        autocomplete: false,
        choices: Vec::new(),
    }
}

/// `role-sync`: administrators only, both role options autocompleted.
pub fn role_sync_command() -> CommandSpec {
    let mut command = CommandSpec::chat_input(ROLE_SYNC_COMMAND, "Sync two roles");
    command.default_member_permissions = Some(Permissions::ADMINISTRATOR);
    command.options = vec![
        CommandOptionSpec {
            autocomplete: true,
            ..string_option(OPTION_ORIGIN, "Role to copy the permissions from")
        },
        CommandOptionSpec {
            autocomplete: true,
            ..string_option(OPTION_TARGET, "Role that receives the permissions")
        },
    ];
    command
}

/// `auto-role` with one fixed choice per rule, or `None` for a guild without
/// rules.
pub fn auto_role_command(rules: &[AutoRoleRule]) -> Option<CommandSpec> {
    if rules.is_empty() {
        return None;
    }
    if rules.len() > MAX_CHOICES {
        warn!(
            rules = rules.len(),
            max = MAX_CHOICES,
            "too many auto-role rules, extra rules are not offered"
        );
    }

    let choices = rules
        .iter()
        .take(MAX_CHOICES)
        .map(|rule| CommandChoice {
            name: rule.name.clone(),
            value: rule.id.clone(),
        })
        .collect();

    let mut command = CommandSpec::chat_input(AUTO_ROLE_COMMAND, "Get an auto role");
    command.options = vec![CommandOptionSpec {
        choices,
        ..string_option(OPTION_ROLE, "Role to get")
    }];
    Some(command)
}

fn is_managed(name: &str) -> bool {
    name == ROLE_SYNC_COMMAND || name == AUTO_ROLE_COMMAND
}

/// Replaces the bot's commands in every guild it belongs to.
///
/// All stale `role-sync`/`auto-role` commands are deleted first, then the
/// current ones are created. Any failure aborts the run.
#[instrument(skip(api, rules))]
pub async fn register_commands(
    api: &dyn CommandApi,
    application_id: &str,
    rules: &AutoRoleTable,
) -> RoleSyncResult<RegistrationSummary> {
    let guilds = api.current_user_guilds().await?;
    let mut summary = RegistrationSummary {
        guilds: guilds.len(),
        ..RegistrationSummary::default()
    };

    for guild in &guilds {
        for command in api.guild_commands(application_id, &guild.id).await? {
            if is_managed(&command.name) {
                api.delete_guild_command(application_id, &guild.id, &command.id)
                    .await?;
                summary.removed += 1;
            }
        }
    }

    for guild in &guilds {
        api.create_guild_command(application_id, &guild.id, &role_sync_command())
            .await?;
        summary.created += 1;

        if let Some(command) = rules.guild(&guild.id).and_then(auto_role_command) {
            api.create_guild_command(application_id, &guild.id, &command)
                .await?;
            summary.created += 1;
        }
        info!(guild_id = %guild.id, guild = %guild.name, "commands registered");
    }

    Ok(summary)
}
