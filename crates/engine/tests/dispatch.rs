//! Dispatcher end to end against the in-memory guild.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rolesync_core::{AutoRoleRule, AutoRoleTable, PermissionOverwrite, Permissions, RuleCondition};
use rolesync_engine::dispatch::{
    AUTO_ROLE_COMMAND, OPTION_ORIGIN, OPTION_ROLE, OPTION_TARGET, ROLE_SYNC_COMMAND,
};
use rolesync_engine::CommandDispatcher;
use rolesync_provider::{GuildApi, InteractionKind, InteractionResponse};
use rolesync_testkit::{
    channel, focused, interaction, member, option, role, Call, FailPoint, MockGuild,
};

const GUILD: &str = "g1";
const VETERAN: &str = "900";

fn guild() -> Arc<MockGuild> {
    let now = Utc::now();
    Arc::new(
        MockGuild::new(GUILD)
            .with_role(role("1", "Admin", Permissions::ADMINISTRATOR))
            .with_role(role("2", "Moderator", Permissions::KICK_MEMBERS | Permissions::BAN_MEMBERS))
            .with_role(role("3", "Member", Permissions::VIEW_CHANNEL))
            .with_role(role(VETERAN, "Veteran", Permissions::empty()))
            .with_channel(channel(
                "c1",
                vec![PermissionOverwrite::role(
                    "2",
                    Permissions::MANAGE_MESSAGES,
                    Permissions::empty(),
                )],
            ))
            .with_channel(channel("c2", vec![]))
            .with_member("old", member("old", &["3"], now - Duration::days(60)))
            .with_member("new", member("new", &["3"], now - Duration::hours(2))),
    )
}

fn rules() -> Arc<AutoRoleTable> {
    let mut table = HashMap::new();
    table.insert(
        GUILD.to_string(),
        vec![AutoRoleRule {
            id: VETERAN.into(),
            name: "Veteran".into(),
            condition: RuleCondition {
                age_on_server: "720h".into(),
            },
        }],
    );
    Arc::new(AutoRoleTable::new(table))
}

fn dispatcher(guild: &Arc<MockGuild>) -> CommandDispatcher {
    let api: Arc<dyn GuildApi> = guild.clone();
    CommandDispatcher::new(api, rules())
}

fn responses(guild: &MockGuild) -> Vec<InteractionResponse> {
    guild
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Respond(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Message text the user ends up seeing, from direct replies and edits of
/// deferred ones.
fn last_message(guild: &MockGuild) -> String {
    guild
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Respond(r) => r.content().map(str::to_string),
            Call::EditOriginal(content) => Some(content),
            _ => None,
        })
        .last()
        .expect("a message response")
}

fn role_sync(origin: &str, target: &str) -> rolesync_provider::Interaction {
    interaction(
        InteractionKind::ApplicationCommand,
        GUILD,
        None,
        ROLE_SYNC_COMMAND,
        vec![option(OPTION_ORIGIN, origin), option(OPTION_TARGET, target)],
    )
}

fn auto_role(guild: &MockGuild, user: &str) -> rolesync_provider::Interaction {
    interaction(
        InteractionKind::ApplicationCommand,
        GUILD,
        guild.member(user),
        AUTO_ROLE_COMMAND,
        vec![option(OPTION_ROLE, VETERAN)],
    )
}

#[tokio::test]
async fn role_sync_reports_changes_then_nothing() {
    let guild = guild();
    let dispatcher = dispatcher(&guild);

    dispatcher.handle(&role_sync("2", "3")).await;
    assert_eq!(
        last_message(&guild),
        "Roles synced successfully, guild permissions updated, 1 channels updated"
    );
    assert_eq!(
        guild.role("3").unwrap().permissions,
        Permissions::KICK_MEMBERS | Permissions::BAN_MEMBERS
    );

    dispatcher.handle(&role_sync("2", "3")).await;
    assert_eq!(
        last_message(&guild),
        "Roles synced successfully, but nothing to update"
    );
}

#[tokio::test]
async fn role_sync_is_acknowledged_before_any_guild_call() {
    let guild = guild();
    dispatcher(&guild).handle(&role_sync("2", "3")).await;

    let calls = guild.calls();
    assert_eq!(calls[0], Call::Respond(InteractionResponse::deferred()));
    assert_eq!(responses(&guild).len(), 1, "only the acknowledgement is a callback");
    assert_eq!(
        calls.last(),
        Some(&Call::EditOriginal(
            "Roles synced successfully, guild permissions updated, 1 channels updated".into()
        ))
    );
}

#[tokio::test]
async fn auto_role_is_answered_directly() {
    let guild = guild();
    dispatcher(&guild).handle(&auto_role(&guild, "old")).await;

    let answers = responses(&guild);
    assert_eq!(answers, [InteractionResponse::message("Role added successfully")]);
    assert!(!guild.calls().iter().any(|c| matches!(c, Call::EditOriginal(_))));
}

#[tokio::test]
async fn failed_edit_still_applies_the_sync() {
    let guild = guild();
    guild.fail_on(FailPoint::EditOriginal);
    dispatcher(&guild).handle(&role_sync("2", "3")).await;

    assert_eq!(
        guild.role("3").unwrap().permissions,
        Permissions::KICK_MEMBERS | Permissions::BAN_MEMBERS
    );
}

#[tokio::test]
async fn role_sync_error_is_reported_to_the_user() {
    let guild = guild();
    dispatcher(&guild).handle(&role_sync("2", "404")).await;
    assert_eq!(
        last_message(&guild),
        "An error occurred while syncing roles: role not found: 404"
    );
    assert!(guild.mutations().is_empty());
}

#[tokio::test]
async fn role_sync_without_target_gets_an_answer() {
    let guild = guild();
    let request = interaction(
        InteractionKind::ApplicationCommand,
        GUILD,
        None,
        ROLE_SYNC_COMMAND,
        vec![option(OPTION_ORIGIN, "2")],
    );
    dispatcher(&guild).handle(&request).await;
    assert_eq!(last_message(&guild), "missing required option: target");
    assert!(guild.mutations().is_empty());
}

#[tokio::test]
async fn autocomplete_filters_by_prefix() {
    let guild = guild();
    let request = interaction(
        InteractionKind::Autocomplete,
        GUILD,
        None,
        ROLE_SYNC_COMMAND,
        vec![focused(OPTION_ORIGIN, "M"), option(OPTION_TARGET, "")],
    );

    let response = dispatcher(&guild).route(&request).await.unwrap();
    let names: Vec<_> = response.choices().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Moderator", "Member"]);
    assert_eq!(response.choices()[0].value, "2");
}

#[tokio::test]
async fn autocomplete_without_roles_stays_silent() {
    let guild = guild();
    guild.fail_on(FailPoint::GuildRoles);
    let request = interaction(
        InteractionKind::Autocomplete,
        GUILD,
        None,
        ROLE_SYNC_COMMAND,
        vec![focused(OPTION_TARGET, "")],
    );

    dispatcher(&guild).handle(&request).await;
    assert!(responses(&guild).is_empty());
}

#[tokio::test]
async fn auto_role_honours_tenure() {
    let guild = guild();
    let dispatcher = dispatcher(&guild);

    dispatcher.handle(&auto_role(&guild, "new")).await;
    assert_eq!(
        last_message(&guild),
        "user does not meet the required age on server"
    );

    dispatcher.handle(&auto_role(&guild, "old")).await;
    assert_eq!(last_message(&guild), "Role added successfully");
    assert!(guild.member("old").unwrap().has_role(VETERAN));

    dispatcher.handle(&auto_role(&guild, "old")).await;
    assert_eq!(last_message(&guild), "user already has the role");
}

#[tokio::test]
async fn auto_role_in_unconfigured_guild() {
    let guild = guild();
    let mut request = auto_role(&guild, "old");
    request.guild_id = Some("elsewhere".into());

    dispatcher(&guild).handle(&request).await;
    assert_eq!(last_message(&guild), "guild not found in config: elsewhere");
}

#[tokio::test]
async fn unknown_commands_and_dms_are_ignored() {
    let guild = guild();
    let dispatcher = dispatcher(&guild);

    let unknown = interaction(InteractionKind::ApplicationCommand, GUILD, None, "ping", vec![]);
    assert!(dispatcher.route(&unknown).await.is_none());

    let mut direct = role_sync("2", "3");
    direct.guild_id = None;
    assert!(dispatcher.route(&direct).await.is_none());

    // Autocomplete on auto-role is not served; its option has fixed choices.
    let fixed = interaction(
        InteractionKind::Autocomplete,
        GUILD,
        None,
        AUTO_ROLE_COMMAND,
        vec![focused(OPTION_ROLE, "")],
    );
    assert!(dispatcher.route(&fixed).await.is_none());
    assert!(guild.calls().is_empty());
}

#[tokio::test]
async fn respond_failure_is_not_fatal() {
    let guild = guild();
    guild.fail_on(FailPoint::Respond);
    let dispatcher = dispatcher(&guild);

    dispatcher.handle(&role_sync("2", "3")).await;
    dispatcher.handle(&role_sync("2", "3")).await;
    assert_eq!(
        last_message(&guild),
        "Roles synced successfully, but nothing to update"
    );
}
