/// Tavern example: a scripted visit to an inn.
///
/// Plays a main conversation with options, variable markup, and a theme,
/// then lets a background crowd chatter until it finishes.
///
/// Run with: cargo run --example tavern

use dialogue_engine::core::actions::{DeliveryError, MessageSink};
use dialogue_engine::core::presenter::{Channel, Presenter, SentenceView, SpriteRef};
use dialogue_engine::core::sprites::SpriteRepository;
use dialogue_engine::schema::conversation::DialogueOption;
use dialogue_engine::{PlaybackState, Session};

const TAVERN: &str = r#"{
  "conversation": [
    {
      "id": 0,
      "canBeUsedAsStartingPoint": true,
      "speakersName": "Mara",
      "characterSpritesName": "Mara",
      "theme": "evening",
      "sentences": [
        "Evening! <speed=0.5>Long road?",
        "Stew's hot and the ale is cold."
      ],
      "options": [
        { "text": "A bowl of stew.", "nextId": 1, "selectedActionNames": ["kitchen"] },
        { "text": "Just passing through.", "nextId": 3 }
      ]
    },
    {
      "id": 1,
      "speakersName": "Mara",
      "sentences": [
        "<registerint=coins>3</registerint>That's three coins.<wait=0.5> Thank you kindly.",
        "<changesprite=Mara>Smiling</changesprite>You've got <retrieveint=coins> coins' worth of stew coming."
      ],
      "nextId": 2
    },
    {
      "id": 2,
      "speakersName": "Old Tom",
      "characterSpritesName": "Tom",
      "sentences": ["Best stew in the valley, that."],
      "onFinishedActionNames": ["crowd"]
    },
    {
      "id": 3,
      "speakersName": "Mara",
      "sentences": ["Safe travels, then.<action=door>"]
    }
  ],
  "actions": [
    { "name": "kitchen", "type": "SendMessage", "target": "Kitchen", "message": "one stew" },
    { "name": "door", "type": "Log", "message": "the door creaks shut" },
    { "name": "crowd", "type": "StartBackgroundConversation", "message": "crowd" }
  ]
}"#;

const CROWD: &str = r#"{
  "conversationType": "BACKGROUND",
  "conversation": [
    { "id": 0, "canBeUsedAsStartingPoint": true, "speakersName": "Farmer",
      "anchorObject": "Hearth", "sentences": ["Rain tomorrow, mark me."], "nextId": 1 },
    { "id": 1, "speakersName": "Miller", "anchorObject": "Bar",
      "sentences": ["You said that yesterday."] }
  ]
}"#;

const SPRITES: &str = r#"(
    characters: {
        "Mara": [
            (name: "Default", image: "mara.png"),
            (name: "Smiling", image: "mara_smile.png"),
        ],
        "Tom": [(name: "Default", image: "tom.png")],
    },
    themes: {
        "evening": [(name: "box", image: "box_evening.png")],
    },
)"#;

/// Frame step for the simulated game loop.
const FRAME: f32 = 1.0 / 30.0;

struct Console;

impl Presenter for Console {
    fn show_sentence(&mut self, channel: Channel, sentence: &SentenceView<'_>) {
        let who = sentence.speaker.unwrap_or("???");
        match channel {
            Channel::Main if sentence.same_speaker => println!("           {}", sentence.text),
            Channel::Main => println!("{:>10}: {}", who, sentence.text),
            Channel::Background(_) => println!("  (overheard) {}: {}", who, sentence.text),
        }
    }

    fn reveal_next_character(&mut self, _channel: Channel) {}

    fn show_options(&mut self, options: &[DialogueOption]) {
        for (i, option) in options.iter().enumerate() {
            println!("           [{}] {}", i + 1, option.text);
        }
    }

    fn change_character_sprite(&mut self, channel: Channel, sprite: Option<&SpriteRef>) {
        if let (Channel::Main, Some(sprite)) = (channel, sprite) {
            println!("           <portrait {}>", sprite.0);
        }
    }

    fn apply_theme(&mut self, theme: &str) {
        println!("--- the lamps are lit ({}) ---", theme);
    }

    fn move_to_anchor(&mut self, _channel: Channel, anchor: &str) {
        println!("  (voices by the {})", anchor.to_lowercase());
    }

    fn close(&mut self, channel: Channel) {
        if channel == Channel::Main {
            println!("--- conversation over ---");
        }
    }
}

struct Kitchen;

impl MessageSink for Kitchen {
    fn deliver_message(&mut self, target: &str, message: &str) -> Result<(), DeliveryError> {
        println!("           ({} hears: {})", target, message);
        Ok(())
    }
}

/// Run frames until the main sentence is fully shown.
fn settle(session: &mut Session) {
    while session.main().is_revealing() {
        session.tick(FRAME);
    }
}

fn main() {
    let mut sprites = SpriteRepository::new();
    sprites
        .parse_ron(SPRITES)
        .expect("Failed to parse sprite manifest");

    let mut session = Session::builder()
        .presenter(Console)
        .sprites(sprites)
        .messages(Kitchen)
        .build()
        .expect("Failed to build session");
    session
        .load_conversation("tavern", TAVERN)
        .expect("Failed to load tavern");
    session
        .load_conversation("crowd", CROWD)
        .expect("Failed to load crowd");

    session
        .start_conversation("tavern")
        .expect("Failed to start tavern");

    // Always order the stew
    while session.main().is_active() {
        settle(&mut session);
        match session.main().state() {
            PlaybackState::ShowingOptions => {
                println!("           > 1");
                session.select_option(0).expect("Option should be valid");
            }
            PlaybackState::Active => session.next().expect("Sentence should be revealed"),
            PlaybackState::Idle => break,
        }
    }

    let mut frames = 0;
    while session.background_count() > 0 && frames < 10_000 {
        session.tick(FRAME);
        frames += 1;
    }

    println!("\nCoins spent: {}", session.variables().retrieve::<i32>("coins"));
    println!("Events: {:?}", session.drain_events());
}
