/// Preview: interactive shell for playing conversation scripts in a terminal.
///
/// Usage: preview --conversations <dir> [--config <engine.ron>] [--sprites <manifest.ron>]
///
/// Commands:
///   start <name>                start a conversation on the main channel
///   bg <name>                   start a background conversation
///   next                        reveal the rest of the sentence, or advance
///   option <n>                  pick a shown option
///   tick <seconds>              let reveal time pass
///   vars                        list registered variables
///   set <kind> <name> <value>   register a variable
///   list                        list loaded conversations
///   stop                        close the main conversation
///   help                        list commands
///   quit                        exit

use dialogue_engine::core::actions::{DeliveryError, MessageSink};
use dialogue_engine::core::config::EngineConfig;
use dialogue_engine::core::presenter::{Channel, Presenter, SentenceView, SpriteRef};
use dialogue_engine::schema::conversation::DialogueOption;
use dialogue_engine::schema::value::VariableKind;
use dialogue_engine::{PlaybackState, Session, SessionEvent};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Long enough to finish any sentence in one step.
const SKIP_SECONDS: f32 = 3600.0;

struct TerminalPresenter;

fn channel_label(channel: Channel) -> String {
    match channel {
        Channel::Main => "main".to_string(),
        Channel::Background(id) => format!("bg#{}", id.0),
    }
}

impl Presenter for TerminalPresenter {
    fn show_sentence(&mut self, channel: Channel, sentence: &SentenceView<'_>) {
        let speaker = sentence.speaker.unwrap_or("...");
        println!("[{}] {}: {}", channel_label(channel), speaker, sentence.text);
    }

    fn reveal_next_character(&mut self, _channel: Channel) {}

    fn sentence_revealed(&mut self, channel: Channel) {
        if channel == Channel::Main {
            println!("  (revealed)");
        }
    }

    fn show_options(&mut self, options: &[DialogueOption]) {
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i, option.text);
        }
    }

    fn change_character_sprite(&mut self, channel: Channel, sprite: Option<&SpriteRef>) {
        match sprite {
            Some(s) => println!("  [{}] sprite -> {}", channel_label(channel), s.0),
            None => println!("  [{}] sprite hidden", channel_label(channel)),
        }
    }

    fn apply_theme(&mut self, theme: &str) {
        println!("  theme -> {}", theme);
    }

    fn move_to_anchor(&mut self, channel: Channel, anchor: &str) {
        println!("  [{}] moves to {}", channel_label(channel), anchor);
    }

    fn close(&mut self, channel: Channel) {
        println!("  [{}] closed", channel_label(channel));
    }
}

struct PrintedMessages;

impl MessageSink for PrintedMessages {
    fn deliver_message(&mut self, target: &str, message: &str) -> Result<(), DeliveryError> {
        println!("  message {} <- {}", target, message);
        Ok(())
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut conversations_dir = None;
    let mut config_path = None;
    let mut sprites_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--conversations" if i + 1 < args.len() => {
                i += 1;
                conversations_dir = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--sprites" if i + 1 < args.len() => {
                i += 1;
                sprites_path = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(ref path) => match EngineConfig::load_from_ron(Path::new(path)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut builder = Session::builder()
        .config(config)
        .presenter(TerminalPresenter)
        .messages(PrintedMessages);
    if let Some(ref dir) = conversations_dir {
        builder = builder.conversations_dir(dir);
    }
    if let Some(ref path) = sprites_path {
        builder = builder.sprites_path(path);
    }
    let mut session = match builder.build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} conversations", session.conversations().len());
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "start" | "bg" => {
                let Some(name) = parts.get(1) else {
                    println!("Usage: {} <name>", cmd);
                    continue;
                };
                let result = if cmd == "start" {
                    session.start_conversation(name)
                } else {
                    session.start_background_conversation(name)
                };
                match result {
                    Ok(channel) => println!("Started '{}' on {}", name, channel_label(channel)),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "next" | "n" => {
                if session.main().is_revealing() {
                    session.tick(SKIP_SECONDS);
                } else if let Err(e) = session.next() {
                    println!("ERROR: {}", e);
                }
            }
            "option" | "o" => {
                let index = match parts.get(1).map(|p| p.parse::<usize>()) {
                    Some(Ok(n)) => n,
                    _ => {
                        println!("Usage: option <n>");
                        continue;
                    }
                };
                if let Err(e) = session.select_option(index) {
                    println!("ERROR: {}", e);
                }
            }
            "tick" => {
                let seconds = match parts.get(1).map(|p| p.parse::<f32>()) {
                    Some(Ok(s)) if s >= 0.0 => s,
                    _ => {
                        println!("Usage: tick <seconds>");
                        continue;
                    }
                };
                session.tick(seconds);
            }
            "vars" => {
                let vars = session.variables().snapshot();
                if vars.is_empty() {
                    println!("No variables registered.");
                }
                for (name, value) in vars {
                    println!("  {}: {} = {}", name, value.kind(), value);
                }
            }
            "set" => {
                if parts.len() < 4 {
                    println!("Usage: set <kind> <name> <value>");
                    println!("  kind: short, int, long, float, bool, string");
                    continue;
                }
                let kind = match VariableKind::from_name(parts[1]) {
                    Ok(k) => k,
                    Err(e) => {
                        println!("ERROR: {}", e);
                        continue;
                    }
                };
                let raw = parts[3..].join(" ");
                if let Err(e) = session.variables_mut().register_parsed(parts[2], &raw, kind) {
                    println!("ERROR: {}", e);
                }
            }
            "list" => {
                for name in session.conversations().names() {
                    let background = session
                        .conversations()
                        .retrieve(name)
                        .is_some_and(|c| c.is_background());
                    println!("  {}{}", name, if background { " (background)" } else { "" });
                }
            }
            "stop" => session.stop_conversation(),
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
            }
        }

        print_events(&mut session);
    }
}

fn print_events(session: &mut Session) {
    for event in session.drain_events() {
        match event {
            SessionEvent::ConversationStarted(name) => println!("  * '{}' started", name),
            SessionEvent::ConversationEnded(name) => println!("  * '{}' ended", name),
            SessionEvent::ThemeChanged(theme) => println!("  * theme is now '{}'", theme),
            SessionEvent::BackgroundStarted { id, name } => {
                println!("  * background '{}' started as bg#{}", name, id.0)
            }
            SessionEvent::BackgroundFinished(id) => println!("  * bg#{} finished", id.0),
        }
    }
    if session.main().state() == PlaybackState::ShowingOptions {
        println!("  (choose with 'option <n>')");
    }
}

fn print_usage() {
    println!("Usage: preview --conversations <dir> [--config <engine.ron>] [--sprites <manifest.ron>]");
}

fn print_help() {
    println!("Commands:");
    println!("  start <name>                Start a conversation");
    println!("  bg <name>                   Start a background conversation");
    println!("  next | n                    Finish revealing, or advance");
    println!("  option <n> | o <n>          Pick a shown option");
    println!("  tick <seconds>              Let reveal time pass");
    println!("  vars                        List variables");
    println!("  set <kind> <name> <value>   Register a variable");
    println!("  list                        List loaded conversations");
    println!("  stop                        Close the main conversation");
    println!("  help                        Show this help");
    println!("  quit                        Exit");
}
