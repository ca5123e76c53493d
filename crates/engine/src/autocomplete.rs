use rolesync_core::Role;
use rolesync_provider::CommandChoice;

/// Most suggestions the platform accepts in one autocomplete response.
pub const MAX_CHOICES: usize = 25;

/// Roles whose name starts with `input`, as (name, id) choices.
///
/// The match is case-sensitive and an empty input matches every role. Order
/// follows `roles`, and the list is cut at [`MAX_CHOICES`].
pub fn filter_role_choices(roles: &[Role], input: &str) -> Vec<CommandChoice> {
    roles
        .iter()
        .filter(|role| role.name.starts_with(input))
        .take(MAX_CHOICES)
        .map(|role| CommandChoice {
            name: role.name.clone(),
            value: role.id.clone(),
        })
        .collect()
}
