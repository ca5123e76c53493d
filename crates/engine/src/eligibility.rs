//! Self-service role grants gated by guild tenure.

use chrono::{DateTime, Utc};
use rolesync_core::tenure::tenure_met;
use rolesync_core::{AutoRoleTable, RoleSyncError};
use rolesync_provider::GuildApi;
use tracing::{error, info, instrument, warn};

/// Outcome of one auto-role request. Only `Granted` involved a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityDecision {
    Granted,
    AlreadyHasRole,
    ConditionNotMet,
    MemberFetchFailed,
    RoleGrantFailed,
    ConditionParseFailed,
    /// The guild or the role has no configured rule.
    RuleNotFound(RoleSyncError),
}

impl EligibilityDecision {
    /// The single message shown to the member.
    pub fn message(&self) -> String {
        match self {
            Self::Granted => "Role added successfully".into(),
            Self::AlreadyHasRole => "user already has the role".into(),
            Self::ConditionNotMet => "user does not meet the required age on server".into(),
            Self::MemberFetchFailed => "cannot fetch member".into(),
            Self::RoleGrantFailed => "cannot add role to user".into(),
            Self::ConditionParseFailed => "cannot parse duration".into(),
            Self::RuleNotFound(err) => err.to_string(),
        }
    }

    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Evaluates auto-role requests against the configured rules.
pub struct EligibilityEvaluator<'a> {
    rules: &'a AutoRoleTable,
    api: &'a dyn GuildApi,
}

impl<'a> EligibilityEvaluator<'a> {
    pub fn new(rules: &'a AutoRoleTable, api: &'a dyn GuildApi) -> Self {
        Self { rules, api }
    }

    /// Evaluates the request and grants the role when eligible.
    pub async fn evaluate(
        &self,
        guild_id: &str,
        role_id: &str,
        member_id: &str,
    ) -> EligibilityDecision {
        self.evaluate_at(guild_id, role_id, member_id, Utc::now())
            .await
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock.
    #[instrument(skip(self, now))]
    pub async fn evaluate_at(
        &self,
        guild_id: &str,
        role_id: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> EligibilityDecision {
        let rule = match self.rules.rule(guild_id, role_id) {
            Ok(rule) => rule,
            Err(e) => {
                info!(error = %e, "no auto-role rule");
                return EligibilityDecision::RuleNotFound(e);
            }
        };

        let member = match self.api.guild_member(guild_id, member_id).await {
            Ok(member) => member,
            Err(e) => {
                warn!(error = %e, "cannot fetch member");
                return EligibilityDecision::MemberFetchFailed;
            }
        };

        if member.has_role(role_id) {
            return EligibilityDecision::AlreadyHasRole;
        }

        match rule.condition.min_tenure() {
            Ok(Some(min_tenure)) if !tenure_met(member.joined_at, min_tenure, now) => {
                info!(
                    rule = %rule.name,
                    joined_at = %member.joined_at,
                    "tenure condition not met"
                );
                return EligibilityDecision::ConditionNotMet;
            }
            Ok(_) => {}
            Err(e) => {
                error!(rule = %rule.name, error = %e, "invalid tenure condition in config");
                return EligibilityDecision::ConditionParseFailed;
            }
        }

        match self.api.add_member_role(guild_id, member_id, role_id).await {
            Ok(()) => {
                info!(rule = %rule.name, "auto-role granted");
                EligibilityDecision::Granted
            }
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "cannot add role to member");
                EligibilityDecision::RoleGrantFailed
            }
        }
    }
}
