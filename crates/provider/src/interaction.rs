//! Interaction and application command payloads.

use rolesync_core::{Member, Permissions};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Interaction type. Unknown values are kept so they can be logged and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum InteractionKind {
    Ping,
    ApplicationCommand,
    MessageComponent,
    Autocomplete,
    ModalSubmit,
    Other(u8),
}

impl From<u8> for InteractionKind {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::Autocomplete,
            5 => Self::ModalSubmit,
            other => Self::Other(other),
        }
    }
}

impl From<InteractionKind> for u8 {
    fn from(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Ping => 1,
            InteractionKind::ApplicationCommand => 2,
            InteractionKind::MessageComponent => 3,
            InteractionKind::Autocomplete => 4,
            InteractionKind::ModalSubmit => 5,
            InteractionKind::Other(other) => other,
        }
    }
}

/// An `INTERACTION_CREATE` payload, trimmed to what the bot reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CommandData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    /// Present for interactions invoked inside a guild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
    pub token: String,
}

impl Interaction {
    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.name.as_str())
    }

    pub fn invoker_id(&self) -> Option<&str> {
        self.member.as_ref().and_then(Member::user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandData {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandDataOption>,
}

impl CommandData {
    pub fn option(&self, name: &str) -> Option<&CommandDataOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// String value of the named option.
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(CommandDataOption::as_str)
    }

    /// The option the user is currently typing in, for autocomplete.
    pub fn focused(&self) -> Option<&CommandDataOption> {
        self.options.iter().find(|o| o.focused)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDataOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub focused: bool,
}

impl CommandDataOption {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(serde_json::Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;
const AUTOCOMPLETE_RESULT: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    pub data: InteractionResponseData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InteractionResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<CommandChoice>>,
}

impl InteractionResponse {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: CHANNEL_MESSAGE_WITH_SOURCE,
            data: InteractionResponseData {
                content: Some(content.into()),
                choices: None,
            },
        }
    }

    /// Acknowledges now; the message is filled in later by editing the
    /// original response.
    pub fn deferred() -> Self {
        Self {
            kind: DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE,
            data: InteractionResponseData::default(),
        }
    }

    pub fn autocomplete(choices: Vec<CommandChoice>) -> Self {
        Self {
            kind: AUTOCOMPLETE_RESULT,
            data: InteractionResponseData {
                content: None,
                choices: Some(choices),
            },
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.data.content.as_deref()
    }

    pub fn choices(&self) -> &[CommandChoice] {
        self.data.choices.as_deref().unwrap_or_default()
    }
}

/// A (label, value) pair offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandChoice {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Command registration
// ---------------------------------------------------------------------------

const CHAT_INPUT: u8 = 1;
pub const OPTION_STRING: u8 = 3;

/// Body of a guild command create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<Permissions>,
    pub options: Vec<CommandOptionSpec>,
}

impl CommandSpec {
    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: CHAT_INPUT,
            default_member_permissions: None,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOptionSpec {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub autocomplete: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<CommandChoice>,
}

/// A command as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredCommand {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_autocomplete_interaction() {
        let raw = r#"{
            "id": "1", "application_id": "2", "type": 4, "token": "tok",
            "guild_id": "10",
            "member": {"user": {"id": "55", "username": "ana"}, "roles": [], "joined_at": "2023-01-01T00:00:00+00:00"},
            "data": {"id": "3", "name": "role-sync", "options": [
                {"name": "origin", "type": 3, "value": "Mo", "focused": true},
                {"name": "target", "type": 3, "value": ""}
            ]}
        }"#;
        let interaction: Interaction = serde_json::from_str(raw).unwrap();
        assert_eq!(interaction.kind, InteractionKind::Autocomplete);
        assert_eq!(interaction.command_name(), Some("role-sync"));
        assert_eq!(interaction.invoker_id(), Some("55"));

        let data = interaction.data.unwrap();
        let focused = data.focused().unwrap();
        assert_eq!(focused.name, "origin");
        assert_eq!(focused.as_str(), Some("Mo"));
        assert_eq!(data.string_option("target"), Some(""));
    }

    #[test]
    fn unknown_interaction_kind_is_kept() {
        let kind: InteractionKind = serde_json::from_str("9").unwrap();
        assert_eq!(kind, InteractionKind::Other(9));
    }

    #[test]
    fn response_shapes() {
        let msg = serde_json::to_value(InteractionResponse::message("hi")).unwrap();
        assert_eq!(msg, serde_json::json!({"type": 4, "data": {"content": "hi"}}));

        let deferred = serde_json::to_value(InteractionResponse::deferred()).unwrap();
        assert_eq!(deferred, serde_json::json!({"type": 5, "data": {}}));

        let ac = serde_json::to_value(InteractionResponse::autocomplete(vec![CommandChoice {
            name: "Admin".into(),
            value: "1".into(),
        }]))
        .unwrap();
        assert_eq!(
            ac,
            serde_json::json!({"type": 8, "data": {"choices": [{"name": "Admin", "value": "1"}]}})
        );
    }

    #[test]
    fn command_spec_serializes_admin_permission_as_string() {
        let mut spec = CommandSpec::chat_input("role-sync", "Sync two roles");
        spec.default_member_permissions = Some(Permissions::ADMINISTRATOR);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["default_member_permissions"], "8");
        assert_eq!(value["type"], 1);
    }
}
