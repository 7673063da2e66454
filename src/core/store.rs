/// Conversation store: parses JSON scripts, validates the graph, and keeps
/// immutable conversations by name.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::actions::{self, ActionError};
use crate::core::condition::{self, ConditionError};
use crate::schema::conversation::{Conversation, Dialogue, NO_NEXT_ID};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("conversation has no dialogues")]
    Empty,
    #[error("dialogue id {0} is used more than once")]
    DuplicateDialogueId(i32),
    #[error("dialogue {0} has no sentences")]
    NoSentences(i32),
    #[error("dialogue {0} has an empty sentence")]
    EmptySentence(i32),
    #[error("dialogue {0} names a starting sprite but no sprite set")]
    SpriteWithoutSet(i32),
    #[error("dialogue {dialogue} points to missing dialogue {next_id}")]
    DanglingNextId { dialogue: i32, next_id: i32 },
    #[error("dialogue {dialogue} has an option with no text")]
    EmptyOptionText { dialogue: i32 },
    #[error("dialogue {dialogue} has an option with no actions and no next dialogue")]
    DeadEndOption { dialogue: i32 },
    #[error("dialogue {dialogue} uses undeclared action '{action}'")]
    UnknownAction { dialogue: i32, action: String },
    #[error("action '{0}' is declared more than once")]
    DuplicateAction(String),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("dialogue {dialogue}: {source}")]
    Condition {
        dialogue: i32,
        #[source]
        source: ConditionError,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("conversation needs a non-empty name")]
    EmptyName,
    #[error("JSON error in '{name}': {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("conversation '{name}' is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: ValidationError,
    },
}

fn check_next(
    ids: &FxHashSet<i32>,
    dialogue: i32,
    next_id: i32,
) -> Result<(), ValidationError> {
    if next_id != NO_NEXT_ID && !ids.contains(&next_id) {
        return Err(ValidationError::DanglingNextId { dialogue, next_id });
    }
    Ok(())
}

fn check_action_names(
    declared: &FxHashSet<&str>,
    dialogue: i32,
    names: &[String],
) -> Result<(), ValidationError> {
    match names.iter().find(|n| !declared.contains(n.as_str())) {
        Some(missing) => Err(ValidationError::UnknownAction {
            dialogue,
            action: missing.clone(),
        }),
        None => Ok(()),
    }
}

fn validate_dialogue(
    dialogue: &Dialogue,
    ids: &FxHashSet<i32>,
    declared: &FxHashSet<&str>,
    background: bool,
) -> Result<(), ValidationError> {
    let id = dialogue.id;
    if dialogue.sentences.is_empty() {
        return Err(ValidationError::NoSentences(id));
    }
    if dialogue.sentences.iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::EmptySentence(id));
    }
    if dialogue.starting_sprite().is_some() && dialogue.sprite_set().is_none() {
        return Err(ValidationError::SpriteWithoutSet(id));
    }
    check_next(ids, id, dialogue.next_id)?;
    check_action_names(declared, id, &dialogue.on_finished_action_names)?;

    for option in &dialogue.options {
        if option.text.trim().is_empty() {
            return Err(ValidationError::EmptyOptionText { dialogue: id });
        }
        check_action_names(declared, id, &option.selected_action_names)?;
        if option.selected_action_names.is_empty() && !option.has_next() {
            return Err(ValidationError::DeadEndOption { dialogue: id });
        }
        check_next(ids, id, option.next_id)?;
    }
    if background && !dialogue.options.is_empty() {
        warn!(dialogue = id, "background dialogues never show options; they are ignored");
    }

    for c in &dialogue.start_conditions {
        condition::validate(c).map_err(|source| ValidationError::Condition {
            dialogue: id,
            source,
        })?;
    }
    Ok(())
}

/// Check the whole graph. Stops at the first problem.
pub fn validate(conversation: &Conversation) -> Result<(), ValidationError> {
    let mut declared = FxHashSet::default();
    for action in &conversation.actions {
        actions::validate_declared(action)?;
        if !declared.insert(action.name.as_str()) {
            return Err(ValidationError::DuplicateAction(action.name.clone()));
        }
    }

    if conversation.dialogues.is_empty() {
        return Err(ValidationError::Empty);
    }
    let mut ids = FxHashSet::default();
    for dialogue in &conversation.dialogues {
        if !ids.insert(dialogue.id) {
            return Err(ValidationError::DuplicateDialogueId(dialogue.id));
        }
    }

    let background = conversation.is_background();
    for dialogue in &conversation.dialogues {
        validate_dialogue(dialogue, &ids, &declared, background)?;
    }
    if !conversation
        .dialogues
        .iter()
        .any(|d| d.can_be_used_as_starting_point)
    {
        warn!("no dialogue is marked as a starting point; the conversation cannot start");
    }
    Ok(())
}

/// Post-validation fixups: cast condition literals, force background auto-proceed.
fn finish_parsing(conversation: &mut Conversation) {
    let background = conversation.is_background();
    for dialogue in &mut conversation.dialogues {
        if background && !dialogue.auto_proceed {
            warn!(
                dialogue = dialogue.id,
                "background dialogues always auto-proceed; autoProceed forced on"
            );
            dialogue.auto_proceed = true;
        }
        for c in &mut dialogue.start_conditions {
            condition::prepare(c);
        }
    }
}

/// Validated conversations by name.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: FxHashMap<String, Rc<Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, validate, and register a JSON script under `name`.
    ///
    /// A conversation that fails is never registered; an earlier
    /// registration under the same name is kept.
    pub fn load(&mut self, name: &str, json: &str) -> Result<(), LoadError> {
        if name.trim().is_empty() {
            error!("cannot load a conversation without a name");
            return Err(LoadError::EmptyName);
        }
        let conversation: Conversation = serde_json::from_str(json).map_err(|source| {
            let err = LoadError::Json {
                name: name.to_string(),
                source,
            };
            error!("{}", err);
            err
        })?;
        self.insert(name, conversation)
    }

    /// Validate and register an already-built conversation.
    pub fn insert(&mut self, name: &str, mut conversation: Conversation) -> Result<(), LoadError> {
        if name.trim().is_empty() {
            error!("cannot register a conversation without a name");
            return Err(LoadError::EmptyName);
        }
        validate(&conversation).map_err(|source| {
            let err = LoadError::Invalid {
                name: name.to_string(),
                source,
            };
            error!("{}", err);
            err
        })?;
        finish_parsing(&mut conversation);

        if self
            .conversations
            .insert(name.to_string(), Rc::new(conversation))
            .is_some()
        {
            warn!(conversation = name, "conversation overwritten");
        } else {
            debug!(conversation = name, "conversation registered");
        }
        Ok(())
    }

    /// Load one file, named after its stem. Returns the name.
    pub fn load_from_path(&mut self, path: &Path) -> Result<String, LoadError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let contents = std::fs::read_to_string(path)?;
        self.load(&name, &contents)?;
        Ok(name)
    }

    /// Load every `*.json` file in `dir`, in file name order.
    ///
    /// Invalid scripts are logged and skipped. Returns the names loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<String>, LoadError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = Vec::new();
        for path in paths {
            match self.load_from_path(&path) {
                Ok(name) => loaded.push(name),
                Err(LoadError::Io(e)) => return Err(LoadError::Io(e)),
                Err(_) => warn!(path = %path.display(), "skipping invalid conversation"),
            }
        }
        info!(count = loaded.len(), dir = %dir.display(), "loaded conversations");
        Ok(loaded)
    }

    pub fn retrieve(&self, name: &str) -> Option<Rc<Conversation>> {
        let found = self.conversations.get(name).cloned();
        if found.is_none() {
            error!(conversation = name, "conversation is not registered");
        }
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conversations.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.conversations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    const GREETING: &str = r#"{
        "conversation": [
            { "id": 0, "canBeUsedAsStartingPoint": true, "speakersName": "Mira",
              "sentences": ["Hello."], "nextId": 1 },
            { "id": 1, "sentences": ["Bye."], "onFinishedActionNames": ["bye"] }
        ],
        "actions": [ { "name": "bye", "type": "Log", "message": "done" } ]
    }"#;

    fn load_err(json: &str) -> ValidationError {
        let mut store = ConversationStore::new();
        match store.load("t", json) {
            Err(LoadError::Invalid { source, .. }) => source,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn valid_conversation_loads() {
        let mut store = ConversationStore::new();
        store.load("greeting", GREETING).unwrap();
        let conversation = store.retrieve("greeting").unwrap();
        assert_eq!(conversation.dialogues.len(), 2);
        assert_eq!(store.names(), vec!["greeting"]);
    }

    #[test]
    fn empty_name_rejected() {
        let mut store = ConversationStore::new();
        assert!(matches!(store.load("  ", GREETING), Err(LoadError::EmptyName)));
    }

    #[test]
    fn malformed_json_rejected() {
        let mut store = ConversationStore::new();
        assert!(matches!(store.load("x", "{ nope"), Err(LoadError::Json { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn failed_reload_keeps_previous() {
        let mut store = ConversationStore::new();
        store.load("greeting", GREETING).unwrap();
        assert!(store.load("greeting", r#"{ "conversation": [] }"#).is_err());
        assert_eq!(store.retrieve("greeting").unwrap().dialogues.len(), 2);
    }

    #[test]
    fn empty_conversation_rejected() {
        assert_eq!(load_err(r#"{ "conversation": [] }"#), ValidationError::Empty);
    }

    #[test]
    fn dangling_next_id_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"], "nextId": 7 } ] }"#;
        assert_eq!(
            load_err(json),
            ValidationError::DanglingNextId { dialogue: 0, next_id: 7 }
        );
    }

    #[test]
    fn empty_sentence_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a", ""] } ] }"#;
        assert_eq!(load_err(json), ValidationError::EmptySentence(0));
    }

    #[test]
    fn starting_sprite_needs_set() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"], "startingSprite": "Happy" } ] }"#;
        assert_eq!(load_err(json), ValidationError::SpriteWithoutSet(0));
    }

    #[test]
    fn undeclared_finish_action_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"], "onFinishedActionNames": ["x"] } ] }"#;
        assert!(matches!(load_err(json), ValidationError::UnknownAction { .. }));
    }

    #[test]
    fn dead_end_option_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"],
            "options": [ { "text": "Leave" } ] } ] }"#;
        assert_eq!(load_err(json), ValidationError::DeadEndOption { dialogue: 0 });
    }

    #[test]
    fn option_with_action_may_end() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"],
            "options": [ { "text": "Leave", "selectedActionNames": ["bye"] } ] } ],
            "actions": [ { "name": "bye", "type": "CloseConversation" } ] }"#;
        let mut store = ConversationStore::new();
        assert!(store.load("t", json).is_ok());
    }

    #[test]
    fn duplicate_action_names_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"] } ],
            "actions": [ { "name": "a", "type": "Log", "message": "x" },
                         { "name": "a", "type": "Log", "message": "y" } ] }"#;
        assert_eq!(load_err(json), ValidationError::DuplicateAction("a".to_string()));
    }

    #[test]
    fn bad_condition_rejected() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"], "startConditions": [
            { "variables": [ { "fromRepo": true, "name": "mood" }, { "value": "ok", "type": "string" } ],
              "comparison": ">" } ] } ] }"#;
        assert!(matches!(load_err(json), ValidationError::Condition { dialogue: 0, .. }));
    }

    #[test]
    fn literals_are_cast_after_load() {
        let json = r#"{ "conversation": [ { "id": 0, "sentences": ["a"], "startConditions": [
            { "variables": [ { "fromRepo": true, "name": "coins" }, { "value": "5", "type": "int" } ],
              "comparison": ">=" } ] } ] }"#;
        let mut store = ConversationStore::new();
        store.load("t", json).unwrap();
        let conversation = store.retrieve("t").unwrap();
        let literal = &conversation.dialogues[0].start_conditions[0].variables[1].literal;
        assert_eq!(literal, &Some(Value::Int(5)));
    }

    #[test]
    fn background_dialogues_forced_to_auto_proceed() {
        let json = r#"{ "conversationType": "BACKGROUND",
            "conversation": [ { "id": 0, "sentences": ["a"], "autoProceed": false } ] }"#;
        let mut store = ConversationStore::new();
        store.load("bg", json).unwrap();
        assert!(store.retrieve("bg").unwrap().dialogues[0].auto_proceed);
    }
}
