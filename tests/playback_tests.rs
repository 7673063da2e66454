/// Playback integration tests: main and background conversations driven
/// through a `Session` with recording presenter and message sink.

use dialogue_engine::core::actions::{DeliveryError, MessageSink};
use dialogue_engine::core::config::{EngineConfig, RevealTimings};
use dialogue_engine::core::presenter::{BackgroundId, Channel, Presenter, SentenceView, SpriteRef};
use dialogue_engine::core::session::{Session, SessionEvent};
use dialogue_engine::schema::conversation::DialogueOption;
use dialogue_engine::{PlaybackError, PlaybackState};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Show(Channel, String),
    Reveal(Channel),
    Revealed(Channel),
    Speaker(Channel, String),
    Options(Vec<String>),
    Sprite(Channel, Option<String>),
    Theme(String),
    Anchor(Channel, String),
    Close(Channel),
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<Call>>>);

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    fn shown(&self, channel: Channel) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Show(ch, text) if ch == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| wanted(c)).count()
    }
}

impl Presenter for Recorder {
    fn show_sentence(&mut self, channel: Channel, sentence: &SentenceView<'_>) {
        self.0.borrow_mut().push(Call::Show(channel, sentence.text.to_string()));
    }

    fn reveal_next_character(&mut self, channel: Channel) {
        self.0.borrow_mut().push(Call::Reveal(channel));
    }

    fn sentence_revealed(&mut self, channel: Channel) {
        self.0.borrow_mut().push(Call::Revealed(channel));
    }

    fn set_speaker_name(&mut self, channel: Channel, name: &str) {
        self.0.borrow_mut().push(Call::Speaker(channel, name.to_string()));
    }

    fn show_options(&mut self, options: &[DialogueOption]) {
        let texts = options.iter().map(|o| o.text.clone()).collect();
        self.0.borrow_mut().push(Call::Options(texts));
    }

    fn change_character_sprite(&mut self, channel: Channel, sprite: Option<&SpriteRef>) {
        let image = sprite.map(|s| s.0.clone());
        self.0.borrow_mut().push(Call::Sprite(channel, image));
    }

    fn apply_theme(&mut self, theme: &str) {
        self.0.borrow_mut().push(Call::Theme(theme.to_string()));
    }

    fn move_to_anchor(&mut self, channel: Channel, anchor: &str) {
        self.0.borrow_mut().push(Call::Anchor(channel, anchor.to_string()));
    }

    fn close(&mut self, channel: Channel) {
        self.0.borrow_mut().push(Call::Close(channel));
    }
}

/// Accepts every target except "Nowhere".
#[derive(Clone, Default)]
struct Mailbox(Rc<RefCell<Vec<(String, String)>>>);

impl Mailbox {
    fn delivered(&self) -> Vec<(String, String)> {
        self.0.borrow().clone()
    }
}

impl MessageSink for Mailbox {
    fn deliver_message(&mut self, target: &str, message: &str) -> Result<(), DeliveryError> {
        if target == "Nowhere" {
            return Err(DeliveryError(target.to_string()));
        }
        self.0
            .borrow_mut()
            .push((target.to_string(), message.to_string()));
        Ok(())
    }
}

fn tavern_session() -> (Session, Recorder, Mailbox) {
    let recorder = Recorder::default();
    let mailbox = Mailbox::default();
    let session = Session::builder()
        .conversations_dir("tests/fixtures/conversations")
        .sprites_path("tests/fixtures/sprites.ron")
        .presenter(recorder.clone())
        .messages(mailbox.clone())
        .build()
        .unwrap();
    (session, recorder, mailbox)
}

/// One-second characters and no start delay, so ticks map to characters.
fn slow_config() -> EngineConfig {
    EngineConfig {
        timings: RevealTimings {
            char_delay: 1.0,
            first_sentence_delay: 0.0,
            ..RevealTimings::default()
        },
        ..EngineConfig::default()
    }
}

fn inline_session(scripts: &[(&str, &str)], config: EngineConfig) -> (Session, Recorder, Mailbox) {
    let recorder = Recorder::default();
    let mailbox = Mailbox::default();
    let mut session = Session::builder()
        .config(config)
        .presenter(recorder.clone())
        .messages(mailbox.clone())
        .build()
        .unwrap();
    for (name, json) in scripts {
        session.load_conversation(name, json).unwrap();
    }
    (session, recorder, mailbox)
}

/// Reveal whatever is pending.
fn finish_sentence(session: &mut Session) {
    session.tick(100.0);
}

#[test]
fn speed_tag_then_action_fires_after_last_character() {
    let script = r#"{
        "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true,
                            "sentences": ["<speed=0.2>Hi<action=greet>"] } ],
        "actions": [ { "name": "greet", "type": "SendMessage", "target": "NPC", "message": "hello" } ]
    }"#;
    let (mut session, recorder, mailbox) = inline_session(&[("greeting", script)], slow_config());
    let is_reveal = |c: &Call| *c == Call::Reveal(Channel::Main);

    assert_eq!(session.start_conversation("greeting"), Ok(Channel::Main));
    assert_eq!(session.main().current_text(), Some("Hi"));

    // Speed applies before 'H'
    session.tick(0.0);
    assert_eq!(recorder.count(is_reveal), 1);
    assert_eq!(session.main().speed_multiplier(), Some(0.2));

    session.tick(0.2);
    assert_eq!(recorder.count(is_reveal), 2);
    assert!(mailbox.delivered().is_empty());

    session.tick(0.2);
    assert_eq!(mailbox.delivered(), vec![("NPC".to_string(), "hello".to_string())]);
    assert!(!session.main().is_revealing());

    session.next().unwrap();
    assert_eq!(session.main().state(), PlaybackState::Idle);
    let events = session.drain_events();
    assert_eq!(
        events,
        vec![
            SessionEvent::ConversationStarted("greeting".to_string()),
            SessionEvent::ConversationEnded("greeting".to_string()),
        ]
    );
}

#[test]
fn tavern_walkthrough() {
    let (mut session, recorder, mailbox) = tavern_session();

    assert_eq!(session.start_conversation("tavern"), Ok(Channel::Main));
    assert_eq!(
        session.drain_events(),
        vec![
            SessionEvent::ConversationStarted("tavern".to_string()),
            SessionEvent::ThemeChanged("day".to_string()),
        ]
    );
    assert_eq!(session.main().current_theme(), Some("day"));
    assert!(recorder
        .calls()
        .contains(&Call::Sprite(Channel::Main, Some("innkeeper.png".to_string()))));

    // Still typing
    assert_eq!(session.next(), Err(PlaybackError::StillRevealing));

    finish_sentence(&mut session);
    session.next().unwrap();
    assert_eq!(session.main().current_text(), Some("What can I get you?"));
    // Same speaker: the name plate is set once
    assert_eq!(recorder.count(|c| matches!(c, Call::Speaker(..))), 1);

    finish_sentence(&mut session);
    session.next().unwrap();
    assert_eq!(session.main().state(), PlaybackState::ShowingOptions);
    assert!(recorder.calls().contains(&Call::Options(vec![
        "An ale, please.".to_string(),
        "Nothing.".to_string()
    ])));
    assert_eq!(session.next(), Err(PlaybackError::AwaitingOption));
    assert_eq!(
        session.select_option(5),
        Err(PlaybackError::OptionOutOfRange { index: 5, count: 2 })
    );

    session.select_option(0).unwrap();
    assert_eq!(mailbox.delivered(), vec![("Tap".to_string(), "Pour".to_string())]);
    assert_eq!(session.main().current_dialogue().map(|d| d.id), Some(1));
    assert_eq!(session.main().current_text(), Some("Here you go."));
    assert_eq!(session.variables().retrieve::<i32>("ales"), 1);

    finish_sentence(&mut session);
    session.next().unwrap();
    assert_eq!(session.main().current_text(), Some("That's 1 ale so far."));

    finish_sentence(&mut session);
    session.next().unwrap();
    assert!(!session.main().is_active());
    assert!(recorder.calls().contains(&Call::Close(Channel::Main)));
    assert!(session
        .drain_events()
        .contains(&SessionEvent::ConversationEnded("tavern".to_string())));
}

#[test]
fn start_conditions_pick_highest_passing_dialogue() {
    let (mut session, recorder, _mailbox) = tavern_session();
    session.variables_mut().register("ales", 2);

    session.start_conversation("tavern").unwrap();
    assert_eq!(session.main().current_dialogue().map(|d| d.id), Some(5));
    assert!(recorder.calls().contains(&Call::Sprite(
        Channel::Main,
        Some("innkeeper_smile.png".to_string())
    )));

    // Finishing runs the chatter action, which starts the crowd
    finish_sentence(&mut session);
    session.next().unwrap();
    assert!(!session.main().is_active());
    assert_eq!(session.background_count(), 1);
    let events = session.drain_events();
    assert!(events.contains(&SessionEvent::BackgroundStarted {
        id: BackgroundId(0),
        name: "crowd".to_string()
    }));
}

#[test]
fn closing_option_ends_conversation() {
    let (mut session, recorder, _mailbox) = tavern_session();
    session.start_conversation("tavern").unwrap();
    for _ in 0..2 {
        finish_sentence(&mut session);
        session.next().unwrap();
    }
    session.select_option(1).unwrap();
    assert_eq!(session.main().state(), PlaybackState::Idle);
    assert_eq!(recorder.count(|c| *c == Call::Close(Channel::Main)), 1);
}

#[test]
fn option_without_next_ends_after_its_actions() {
    let script = r#"{
        "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true, "sentences": ["Bye?"],
            "options": [ { "text": "Wave", "selectedActionNames": ["wave"] } ] } ],
        "actions": [ { "name": "wave", "type": "SendMessage", "target": "Hand", "message": "wave" } ]
    }"#;
    let (mut session, _recorder, mailbox) = inline_session(&[("bye", script)], slow_config());
    session.start_conversation("bye").unwrap();
    finish_sentence(&mut session);
    session.next().unwrap();
    session.select_option(0).unwrap();
    assert_eq!(mailbox.delivered().len(), 1);
    assert!(!session.main().is_active());
}

#[test]
fn background_conversation_chains_and_finishes() {
    let (mut session, recorder, _mailbox) = tavern_session();
    let channel = session.start_conversation("crowd").unwrap();
    let Channel::Background(id) = channel else {
        panic!("crowd should be redirected to a background engine");
    };
    assert!(!session.main().is_active());

    for _ in 0..50 {
        if session.background_count() == 0 {
            break;
        }
        session.tick(10.0);
    }
    assert_eq!(session.background_count(), 0);
    assert_eq!(
        recorder.shown(channel),
        vec!["Ha!".to_string(), "Another round!".to_string(), "La la.".to_string()]
    );
    let anchors: Vec<_> = recorder
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Anchor(ch, anchor) if ch == channel => Some(anchor),
            _ => None,
        })
        .collect();
    assert_eq!(anchors, vec!["Table".to_string(), "Stage".to_string()]);
    // hidesprite does nothing in the background
    assert_eq!(recorder.count(|c| matches!(c, Call::Sprite(ch, _) if *ch == channel)), 0);
    assert!(session
        .drain_events()
        .contains(&SessionEvent::BackgroundFinished(id)));
}

#[test]
fn background_waits_for_start_delay() {
    let (mut session, recorder, _mailbox) = tavern_session();
    let channel = session.start_background_conversation("crowd").unwrap();

    session.tick(0.3);
    assert_eq!(recorder.count(|c| *c == Call::Reveal(channel)), 0);
    session.tick(0.15);
    assert_eq!(recorder.count(|c| *c == Call::Reveal(channel)), 1);
}

#[test]
fn main_conversation_started_as_background_is_redirected() {
    let (mut session, _recorder, _mailbox) = tavern_session();
    assert_eq!(session.start_background_conversation("tavern"), Ok(Channel::Main));
    assert!(session.main().is_active());
    assert_eq!(session.background_count(), 0);
}

#[test]
fn closebg_tag_stops_background_conversations() {
    let main = r#"{ "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true,
        "sentences": ["<closebgconversations>Quiet!"] } ] }"#;
    let crowd = r#"{ "conversationType": "BACKGROUND", "conversation": [
        { "id": 0, "canBeUsedAsStartingPoint": true, "sentences": ["Chatter chatter chatter."] } ] }"#;
    let (mut session, _recorder, _mailbox) =
        inline_session(&[("quiet", main), ("crowd", crowd)], slow_config());

    session.start_background_conversation("crowd").unwrap();
    session.start_background_conversation("crowd").unwrap();
    assert_eq!(session.background_count(), 2);

    session.start_conversation("quiet").unwrap();
    session.tick(0.0);
    assert_eq!(session.background_count(), 0);
    let finished = session
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::BackgroundFinished(_)))
        .count();
    assert_eq!(finished, 2);
}

#[test]
fn background_theme_action_reaches_main_channel() {
    let crowd = r#"{ "conversationType": "BACKGROUND",
        "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true, "sentences": ["<action=dusk>Getting late."] } ],
        "actions": [ { "name": "dusk", "type": "ChangeTheme", "message": "night" } ] }"#;
    let (mut session, recorder, _mailbox) = inline_session(&[("crowd", crowd)], slow_config());
    session.start_background_conversation("crowd").unwrap();
    session.tick(1.0);

    assert!(recorder.calls().contains(&Call::Theme("night".to_string())));
    assert_eq!(session.main().current_theme(), Some("night"));
}

#[test]
fn broken_markup_and_missing_actions_do_not_stop_playback() {
    let script = r#"{
        "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true,
            "sentences": ["<action=ghost><sendmessage=Nowhere>hi</sendmessage>Still here."] } ]
    }"#;
    let (mut session, _recorder, mailbox) = inline_session(&[("odd", script)], slow_config());
    session.start_conversation("odd").unwrap();
    finish_sentence(&mut session);

    assert_eq!(session.main().current_text(), Some("Still here."));
    assert!(session.main().is_active());
    assert!(!session.main().is_revealing());
    assert!(mailbox.delivered().is_empty());
}

#[test]
fn tags_mutate_variables_during_reveal() {
    let script = r#"{ "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true,
        "sentences": ["Forget it.<removevariable=secret>"] } ] }"#;
    let (mut session, _recorder, _mailbox) = inline_session(&[("forget", script)], slow_config());
    session.variables_mut().register("secret", "swordfish");

    session.start_conversation("forget").unwrap();
    assert!(session.variables().contains("secret"));
    finish_sentence(&mut session);
    assert!(!session.variables().contains("secret"));
}

#[test]
fn usage_errors() {
    let (mut session, _recorder, _mailbox) = tavern_session();

    assert_eq!(
        session.start_conversation("missing"),
        Err(PlaybackError::ConversationNotFound("missing".to_string()))
    );
    // Idle: silently ignored
    assert_eq!(session.next(), Ok(()));
    assert_eq!(session.select_option(0), Ok(()));

    session.start_conversation("tavern").unwrap();
    assert_eq!(
        session.start_conversation("tavern"),
        Err(PlaybackError::AlreadyActive)
    );
    finish_sentence(&mut session);
    assert_eq!(session.select_option(0), Err(PlaybackError::NoOptions));
}

#[test]
fn no_passing_start_dialogue_is_an_error() {
    let script = r#"{ "conversation": [ { "id": 0, "canBeUsedAsStartingPoint": true, "sentences": ["Hi"],
        "startConditions": [ { "variables": [ { "fromRepo": true, "name": "met" },
                                             { "value": "true", "type": "bool" } ],
                               "comparison": "==" } ] } ] }"#;
    let (mut session, _recorder, _mailbox) = inline_session(&[("gated", script)], slow_config());
    assert_eq!(
        session.start_conversation("gated"),
        Err(PlaybackError::NoStartingPoint("gated".to_string()))
    );

    session.variables_mut().register("met", true);
    assert_eq!(session.start_conversation("gated"), Ok(Channel::Main));
}
