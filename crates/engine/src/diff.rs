//! Per-channel overwrite diffing.
//!
//! Pure decision logic: given the origin role's overwrite and the target
//! role's overwrite on one channel, decide what the target needs. No I/O.

use rolesync_core::{PermissionOverwrite, Permissions};

/// What to do with the target role's overwrite on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteAction {
    /// Already in sync, or neither role has an overwrite.
    Skip,
    /// Create or replace the target overwrite with these values.
    Upsert { allow: Permissions, deny: Permissions },
    /// The origin has no overwrite; remove the target's.
    Delete,
}

/// Decides how the target overwrite must change to mirror the origin.
///
/// Order matters: both-absent and equal-values are checked before the
/// delete and upsert cases, which is what makes a repeated sync write-free.
pub fn diff_overwrites(
    origin: Option<&PermissionOverwrite>,
    target: Option<&PermissionOverwrite>,
) -> OverwriteAction {
    match (origin, target) {
        (None, None) => OverwriteAction::Skip,
        (Some(o), Some(t)) if o.same_values(t) => OverwriteAction::Skip,
        (None, Some(_)) => OverwriteAction::Delete,
        (Some(o), _) => OverwriteAction::Upsert {
            allow: o.allow,
            deny: o.deny,
        },
    }
}
