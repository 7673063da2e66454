/// Loading integration tests: fixture scripts, directories, and session wiring.

use dialogue_engine::core::presenter::{SpriteRef, SpriteResolver};
use dialogue_engine::core::sprites::SpriteRepository;
use dialogue_engine::core::store::{ConversationStore, LoadError, ValidationError};
use dialogue_engine::schema::conversation::ConversationType;
use dialogue_engine::Session;
use std::path::Path;

#[test]
fn load_dir_skips_invalid_scripts() {
    let mut store = ConversationStore::new();
    let loaded = store
        .load_dir(Path::new("tests/fixtures/conversations"))
        .unwrap();

    // Sorted by file name; broken.json is skipped
    assert_eq!(loaded, vec!["crowd".to_string(), "tavern".to_string()]);
    assert!(!store.contains("broken"));
    assert_eq!(store.names(), vec!["crowd", "tavern"]);
}

#[test]
fn load_from_path_uses_file_stem() {
    let mut store = ConversationStore::new();
    let name = store
        .load_from_path(Path::new("tests/fixtures/conversations/crowd.json"))
        .unwrap();
    assert_eq!(name, "crowd");

    let crowd = store.retrieve("crowd").unwrap();
    assert_eq!(crowd.conversation_type, ConversationType::Background);
    assert!(crowd.dialogues.iter().all(|d| d.auto_proceed));
}

#[test]
fn broken_fixture_reports_dangling_link() {
    let mut store = ConversationStore::new();
    let err = store
        .load_from_path(Path::new("tests/fixtures/conversations/broken.json"))
        .unwrap_err();
    match err {
        LoadError::Invalid { name, source } => {
            assert_eq!(name, "broken");
            assert_eq!(
                source,
                ValidationError::DanglingNextId {
                    dialogue: 0,
                    next_id: 3
                }
            );
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let mut store = ConversationStore::new();
    let err = store
        .load_from_path(Path::new("tests/fixtures/conversations/nope.json"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}

#[test]
fn tavern_fixture_round_trips_through_serde() {
    let mut store = ConversationStore::new();
    store
        .load_from_path(Path::new("tests/fixtures/conversations/tavern.json"))
        .unwrap();
    let tavern = store.retrieve("tavern").unwrap();

    let json = serde_json::to_string(&*tavern).unwrap();
    let mut again = ConversationStore::new();
    again.load("tavern", &json).unwrap();
    assert_eq!(again.retrieve("tavern").unwrap().dialogues, tavern.dialogues);
}

#[test]
fn sprite_manifest_fixture() {
    let mut sprites = SpriteRepository::new();
    sprites
        .load_from_ron(Path::new("tests/fixtures/sprites.ron"))
        .unwrap();
    assert_eq!(
        sprites.resolve_sprite("Innkeeper", "Smiling"),
        Some(SpriteRef("innkeeper_smile.png".to_string()))
    );
    assert_eq!(
        sprites.resolve_theme_sprite("day", "box"),
        Some(SpriteRef("box_day.png".to_string()))
    );
}

#[test]
fn session_builder_loads_everything_from_disk() {
    let session = Session::builder()
        .conversations_dir("tests/fixtures/conversations")
        .config_path("tests/fixtures/engine.ron")
        .sprites_path("tests/fixtures/sprites.ron")
        .build()
        .unwrap();

    assert_eq!(session.conversations().len(), 2);
    assert_eq!(session.config().log_level, "debug");
    assert_eq!(session.config().timings.char_delay, 0.02);
    assert!(!session.main().is_active());
}

#[test]
fn session_builder_reports_bad_config() {
    let result = Session::builder()
        .config_path("tests/fixtures/missing.ron")
        .build();
    assert!(result.is_err());
}
