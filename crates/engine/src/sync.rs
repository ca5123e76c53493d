//! Role permission synchronization.
//!
//! Copies the origin role's guild-level permissions and every role-typed
//! channel overwrite onto the target role. Each step is a separate remote
//! call; nothing is rolled back. A failure stops the run and reports the
//! counters accumulated so far, and re-running converges the rest because
//! every write is derived from the origin's current state.

use crate::diff::{diff_overwrites, OverwriteAction};
use rolesync_core::{PermissionOverwrite, Role, RoleEdit, RoleSyncError, SyncResult};
use rolesync_provider::GuildApi;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// A failed synchronization, with whatever was applied before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source}")]
pub struct SyncError {
    pub partial: SyncResult,
    #[source]
    pub source: RoleSyncError,
}

impl SyncError {
    fn new(partial: SyncResult, source: RoleSyncError) -> Self {
        Self { partial, source }
    }
}

fn find_role<'a>(roles: &'a [Role], role_id: &str) -> Result<&'a Role, RoleSyncError> {
    roles
        .iter()
        .find(|r| r.id == role_id)
        .ok_or_else(|| RoleSyncError::RoleNotFound(role_id.to_string()))
}

/// Makes `target_role_id` carry the same permissions as `origin_role_id`.
///
/// Guild-level permissions are edited first; if that edit fails no channel
/// is touched. Channels are then processed in platform order, and the first
/// failing channel write aborts the run.
#[instrument(skip(api))]
pub async fn synchronize_roles(
    api: &dyn GuildApi,
    guild_id: &str,
    origin_role_id: &str,
    target_role_id: &str,
) -> Result<SyncResult, SyncError> {
    let mut result = SyncResult::default();

    let roles = api
        .guild_roles(guild_id)
        .await
        .map_err(|e| SyncError::new(result, e))?;
    let origin = find_role(&roles, origin_role_id).map_err(|e| SyncError::new(result, e))?;
    let target = find_role(&roles, target_role_id).map_err(|e| SyncError::new(result, e))?;

    if origin.permissions != target.permissions {
        api.edit_role(guild_id, target_role_id, &RoleEdit::from(origin))
            .await
            .map_err(|e| SyncError::new(result, e))?;
        result.guild_permissions_changed = true;
        info!(
            origin = %origin.name,
            target = %target.name,
            permissions = origin.permissions.bits(),
            "guild permissions copied"
        );
    }

    let channels = api
        .guild_channels(guild_id)
        .await
        .map_err(|e| SyncError::new(result, e))?;

    for channel in &channels {
        let action = diff_overwrites(
            channel.role_overwrite(origin_role_id),
            channel.role_overwrite(target_role_id),
        );

        let write = match action {
            OverwriteAction::Skip => continue,
            OverwriteAction::Upsert { allow, deny } => {
                let overwrite = PermissionOverwrite::role(target_role_id, allow, deny);
                api.set_channel_overwrite(&channel.id, &overwrite).await
            }
            OverwriteAction::Delete => {
                api.delete_channel_overwrite(&channel.id, target_role_id)
                    .await
            }
        };
        write.map_err(|e| SyncError::new(result, e))?;

        result.channels_updated += 1;
        debug!(channel_id = %channel.id, ?action, "channel overwrite synced");
    }

    info!(
        channels = channels.len(),
        channels_updated = result.channels_updated,
        guild_permissions_changed = result.guild_permissions_changed,
        "role sync complete"
    );
    Ok(result)
}
