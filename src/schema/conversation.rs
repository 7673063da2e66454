/// Conversation graph: dialogues, options, and the actions they reference.

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::condition::Condition;

/// Sentinel for "no next dialogue".
pub const NO_NEXT_ID: i32 = -1;

fn no_next_id() -> i32 {
    NO_NEXT_ID
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Which engine plays a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationType {
    #[default]
    #[serde(alias = "default", alias = "Default")]
    Default,
    #[serde(alias = "background", alias = "Background")]
    Background,
}

/// A player choice shown after a dialogue's last sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueOption {
    #[serde(default)]
    pub text: String,
    #[serde(default = "no_next_id")]
    pub next_id: i32,
    #[serde(default)]
    pub selected_action_names: Vec<String>,
}

impl DialogueOption {
    pub fn has_next(&self) -> bool {
        self.next_id != NO_NEXT_ID
    }
}

/// One node of a conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialogue {
    pub id: i32,
    #[serde(default = "no_next_id")]
    pub next_id: i32,
    #[serde(default)]
    pub speakers_name: Option<String>,
    #[serde(default)]
    pub sentences: Vec<String>,
    #[serde(default)]
    pub options: Vec<DialogueOption>,
    #[serde(default)]
    pub start_conditions: Vec<Condition>,
    #[serde(default)]
    pub can_be_used_as_starting_point: bool,
    #[serde(default)]
    pub auto_proceed: bool,
    #[serde(default)]
    pub character_sprites_name: Option<String>,
    #[serde(default)]
    pub starting_sprite: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub on_finished_action_names: Vec<String>,
    #[serde(default)]
    pub anchor_object: Option<String>,
}

impl Dialogue {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            next_id: NO_NEXT_ID,
            speakers_name: None,
            sentences: Vec::new(),
            options: Vec::new(),
            start_conditions: Vec::new(),
            can_be_used_as_starting_point: false,
            auto_proceed: false,
            character_sprites_name: None,
            starting_sprite: None,
            theme: None,
            on_finished_action_names: Vec::new(),
            anchor_object: None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_id != NO_NEXT_ID
    }

    pub fn speaker(&self) -> Option<&str> {
        non_blank(&self.speakers_name)
    }

    pub fn sprite_set(&self) -> Option<&str> {
        non_blank(&self.character_sprites_name)
    }

    pub fn starting_sprite(&self) -> Option<&str> {
        non_blank(&self.starting_sprite)
    }

    pub fn theme(&self) -> Option<&str> {
        non_blank(&self.theme)
    }

    pub fn anchor(&self) -> Option<&str> {
        non_blank(&self.anchor_object)
    }
}

/// A named, immutable conversation graph as loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default, rename = "conversation")]
    pub dialogues: Vec<Dialogue>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub conversation_type: ConversationType,
}

impl Conversation {
    pub fn is_background(&self) -> bool {
        self.conversation_type == ConversationType::Background
    }

    pub fn dialogue(&self, id: i32) -> Option<&Dialogue> {
        self.dialogues.iter().find(|d| d.id == id)
    }

    pub fn dialogue_index(&self, id: i32) -> Option<usize> {
        self.dialogues.iter().position(|d| d.id == id)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["Hi"] } ] }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        let dialogue = &conversation.dialogues[0];
        assert_eq!(dialogue.next_id, NO_NEXT_ID);
        assert!(!dialogue.can_be_used_as_starting_point);
        assert!(!dialogue.auto_proceed);
        assert_eq!(conversation.conversation_type, ConversationType::Default);
        assert!(conversation.actions.is_empty());
    }

    #[test]
    fn conversation_type_accepts_either_case() {
        let upper: ConversationType = serde_json::from_str("\"BACKGROUND\"").unwrap();
        let lower: ConversationType = serde_json::from_str("\"background\"").unwrap();
        assert_eq!(upper, ConversationType::Background);
        assert_eq!(lower, ConversationType::Background);
    }

    #[test]
    fn blank_strings_read_as_absent() {
        let mut dialogue = Dialogue::new(1);
        dialogue.speakers_name = Some(String::new());
        dialogue.theme = Some("  ".to_string());
        assert_eq!(dialogue.speaker(), None);
        assert_eq!(dialogue.theme(), None);
    }

    #[test]
    fn lookups_by_id_and_name() {
        let json = r#"{
            "conversation": [ { "id": 4, "sentences": ["a"] }, { "id": 9, "sentences": ["b"] } ],
            "actions": [ { "name": "bye", "type": "CloseConversation" } ]
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.dialogue_index(9), Some(1));
        assert!(conversation.dialogue(5).is_none());
        assert!(conversation.action("bye").is_some());
    }
}
