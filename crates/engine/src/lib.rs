//! Role permission sync, auto-role eligibility, command dispatch and registration.

pub mod autocomplete;
pub mod diff;
pub mod dispatch;
pub mod eligibility;
pub mod registration;
pub mod sync;

pub use diff::{diff_overwrites, OverwriteAction};
pub use dispatch::{compose_sync_message, CommandDispatcher};
pub use eligibility::{EligibilityDecision, EligibilityEvaluator};
pub use registration::{register_commands, RegistrationSummary};
pub use sync::{synchronize_roles, SyncError};
