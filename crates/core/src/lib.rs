//! Domain models, configuration, and error definitions.
//!
//! Foundation crate -- no async or network dependencies.

pub mod config;
pub mod error;
pub mod tenure;
pub mod types;

pub use config::{AutoRoleRule, AutoRoleTable, Config, DiscordSettings, RuleCondition};
pub use error::{RoleSyncError, RoleSyncResult};
pub use types::{
    Channel, Member, OverwriteKind, PartialGuild, PermissionOverwrite, Permissions, Role,
    RoleEdit, SyncResult, User,
};
