use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed vocabulary of action types a script may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Log,
    LogWarning,
    LogError,
    CloseConversation,
    ChangeTheme,
    SendMessage,
    StartBackgroundConversation,
    CloseBackgroundConversations,
}

impl ActionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log => "Log",
            Self::LogWarning => "LogWarning",
            Self::LogError => "LogError",
            Self::CloseConversation => "CloseConversation",
            Self::ChangeTheme => "ChangeTheme",
            Self::SendMessage => "SendMessage",
            Self::StartBackgroundConversation => "StartBackgroundConversation",
            Self::CloseBackgroundConversations => "CloseBackgroundConversations",
        }
    }

    /// Lenient lookup: case, underscores, and spaces are ignored, so
    /// `"LOG_WARNING"`, `"logWarning"` and `"LogWarning"` all match.
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "log" => Some(Self::Log),
            "logwarning" => Some(Self::LogWarning),
            "logerror" => Some(Self::LogError),
            "closeconversation" => Some(Self::CloseConversation),
            "changetheme" => Some(Self::ChangeTheme),
            "sendmessage" => Some(Self::SendMessage),
            "startbackgroundconversation" | "startbgconversation" => {
                Some(Self::StartBackgroundConversation)
            }
            "closebackgroundconversations" | "closebgconversations" => {
                Some(Self::CloseBackgroundConversations)
            }
            _ => None,
        }
    }

    pub fn requires_message(&self) -> bool {
        matches!(
            self,
            Self::Log
                | Self::LogWarning
                | Self::LogError
                | Self::ChangeTheme
                | Self::SendMessage
                | Self::StartBackgroundConversation
        )
    }

    pub fn requires_target(&self) -> bool {
        matches!(self, Self::SendMessage)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named action declared by a conversation.
///
/// `message` and `target` may be left empty in the script and supplied at
/// dispatch time by the option or tag that fires the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl Action {
    pub fn new(name: &str, action_type: ActionType) -> Self {
        Self {
            name: name.to_string(),
            type_name: action_type.name().to_string(),
            message: None,
            target: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn action_type(&self) -> Option<ActionType> {
        ActionType::from_name(&self.type_name)
    }

    /// The message, if present and not blank.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// The target, if present and not blank.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_are_lenient() {
        assert_eq!(ActionType::from_name("LOG_WARNING"), Some(ActionType::LogWarning));
        assert_eq!(ActionType::from_name("sendMessage"), Some(ActionType::SendMessage));
        assert_eq!(
            ActionType::from_name("CLOSE_BG_CONVERSATIONS"),
            Some(ActionType::CloseBackgroundConversations)
        );
        assert_eq!(ActionType::from_name("explode"), None);
    }

    #[test]
    fn blank_fields_read_as_missing() {
        let action = Action::new("ping", ActionType::SendMessage)
            .with_message("  ")
            .with_target("Chest");
        assert_eq!(action.message(), None);
        assert_eq!(action.target(), Some("Chest"));
    }

    #[test]
    fn action_from_json() {
        let json = r#"{ "name": "openChest", "type": "SendMessage", "message": "Open", "target": "Chest" }"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(action.action_type(), Some(ActionType::SendMessage));
        assert_eq!(action.message(), Some("Open"));
    }
}
