//! Routes inbound interactions to the synchronizer, the eligibility
//! evaluator, or role-name autocomplete.

use std::sync::Arc;

use rolesync_core::{AutoRoleTable, SyncResult};
use rolesync_provider::{CommandData, GuildApi, Interaction, InteractionKind, InteractionResponse};
use tracing::{debug, error, instrument, warn};

use crate::autocomplete::filter_role_choices;
use crate::eligibility::EligibilityEvaluator;
use crate::sync::{synchronize_roles, SyncError};

pub const ROLE_SYNC_COMMAND: &str = "role-sync";
pub const AUTO_ROLE_COMMAND: &str = "auto-role";
pub const OPTION_ORIGIN: &str = "origin";
pub const OPTION_TARGET: &str = "target";
pub const OPTION_ROLE: &str = "role";

/// Builds the role-sync reply from the synchronizer's outcome.
pub fn compose_sync_message(outcome: &Result<SyncResult, SyncError>) -> String {
    let result = match outcome {
        Ok(result) => result,
        Err(e) => return format!("An error occurred while syncing roles: {e}"),
    };

    let mut message = String::from("Roles synced successfully");
    if result.guild_permissions_changed {
        message.push_str(", guild permissions updated");
    }
    if result.channels_updated > 0 {
        message.push_str(&format!(", {} channels updated", result.channels_updated));
    }
    if result.is_noop() {
        message.push_str(", but nothing to update");
    }
    message
}

/// Interactions acknowledged up front and answered by editing the original
/// response. A role sync can outlast the three-second acknowledgement window.
fn is_deferred(interaction: &Interaction) -> bool {
    interaction.kind == InteractionKind::ApplicationCommand
        && interaction.guild_id.is_some()
        && interaction.command_name() == Some(ROLE_SYNC_COMMAND)
}

fn missing_option(name: &str) -> InteractionResponse {
    InteractionResponse::message(format!("missing required option: {name}"))
}

/// Shared, read-only handler for every interaction the gateway delivers.
pub struct CommandDispatcher {
    api: Arc<dyn GuildApi>,
    rules: Arc<AutoRoleTable>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn GuildApi>, rules: Arc<AutoRoleTable>) -> Self {
        Self { api, rules }
    }

    /// Routes the interaction and sends the reply, if any. A role sync is
    /// acknowledged with a deferred response before any guild call, and its
    /// outcome then replaces that response.
    #[instrument(
        skip_all,
        fields(
            interaction_id = %interaction.id,
            command = interaction.command_name().unwrap_or_default(),
            guild_id = interaction.guild_id.as_deref().unwrap_or_default(),
        )
    )]
    pub async fn handle(&self, interaction: &Interaction) {
        let deferred = is_deferred(interaction);
        if deferred {
            if let Err(e) = self.api.respond(interaction, &InteractionResponse::deferred()).await {
                error!(error = %e, "deferring interaction failed");
            }
        }

        let Some(response) = self.route(interaction).await else {
            return;
        };
        let sent = if deferred {
            let content = response.content().unwrap_or_default();
            self.api.edit_original_response(interaction, content).await
        } else {
            self.api.respond(interaction, &response).await
        };
        if let Err(e) = sent {
            error!(error = %e, deferred, "responding to interaction failed");
        }
    }

    /// The reply for an interaction, or `None` when it is not ours to answer.
    pub async fn route(&self, interaction: &Interaction) -> Option<InteractionResponse> {
        let Some(data) = interaction.data.as_ref() else {
            debug!(kind = ?interaction.kind, "interaction without command data");
            return None;
        };
        let Some(guild_id) = interaction.guild_id.as_deref() else {
            debug!(command = %data.name, "ignoring interaction outside a guild");
            return None;
        };

        match (interaction.kind, data.name.as_str()) {
            (InteractionKind::Autocomplete, ROLE_SYNC_COMMAND) => {
                self.role_autocomplete(guild_id, data).await
            }
            (InteractionKind::ApplicationCommand, ROLE_SYNC_COMMAND) => {
                Some(self.role_sync(guild_id, data).await)
            }
            (InteractionKind::ApplicationCommand, AUTO_ROLE_COMMAND) => {
                Some(self.auto_role(guild_id, data, interaction.invoker_id()).await)
            }
            (kind, name) => {
                debug!(?kind, command = name, "unhandled interaction");
                None
            }
        }
    }

    async fn role_sync(&self, guild_id: &str, data: &CommandData) -> InteractionResponse {
        let Some(origin) = data.string_option(OPTION_ORIGIN) else {
            warn!("role-sync invoked without origin");
            return missing_option(OPTION_ORIGIN);
        };
        let Some(target) = data.string_option(OPTION_TARGET) else {
            warn!("role-sync invoked without target");
            return missing_option(OPTION_TARGET);
        };

        let outcome = synchronize_roles(self.api.as_ref(), guild_id, origin, target).await;
        match &outcome {
            Err(e) if e.source.is_lookup() => warn!(error = %e, "role sync rejected"),
            Err(e) => error!(
                error = %e,
                channels_updated = e.partial.channels_updated,
                "syncing roles failed"
            ),
            Ok(_) => {}
        }
        InteractionResponse::message(compose_sync_message(&outcome))
    }

    async fn auto_role(
        &self,
        guild_id: &str,
        data: &CommandData,
        invoker_id: Option<&str>,
    ) -> InteractionResponse {
        let Some(role_id) = data.string_option(OPTION_ROLE) else {
            warn!("auto-role invoked without role");
            return missing_option(OPTION_ROLE);
        };
        let Some(member_id) = invoker_id else {
            warn!("auto-role invoked without a member");
            return InteractionResponse::message("cannot fetch member");
        };

        let decision = EligibilityEvaluator::new(&self.rules, self.api.as_ref())
            .evaluate(guild_id, role_id, member_id)
            .await;
        InteractionResponse::message(decision.message())
    }

    async fn role_autocomplete(
        &self,
        guild_id: &str,
        data: &CommandData,
    ) -> Option<InteractionResponse> {
        let focused = data.focused()?;
        if focused.name != OPTION_ORIGIN && focused.name != OPTION_TARGET {
            return None;
        }

        let roles = match self.api.guild_roles(guild_id).await {
            Ok(roles) => roles,
            Err(e) => {
                error!(error = %e, "fetching roles for autocomplete failed");
                return None;
            }
        };
        let input = focused.as_str().unwrap_or_default();
        Some(InteractionResponse::autocomplete(filter_role_choices(
            &roles, input,
        )))
    }
}
