/// Conversation Linter: validates conversation scripts and reports markup,
/// action, and reachability problems.
///
/// Usage: conversation_linter <file_or_dir> [--sprites <manifest.ron>]

use dialogue_engine::core::actions;
use dialogue_engine::core::presenter::SpriteResolver;
use dialogue_engine::core::sprites::SpriteRepository;
use dialogue_engine::core::store;
use dialogue_engine::core::tags::{ParsedSentence, TagCommand};
use dialogue_engine::core::variables::VariableStore;
use dialogue_engine::schema::conversation::Conversation;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: conversation_linter <file_or_dir> [--sprites <manifest.ron>]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut sprites_path = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--sprites" && i + 1 < args.len() {
            i += 1;
            sprites_path = Some(args[i].clone());
        }
        i += 1;
    }

    let sprites = match sprites_path {
        Some(ref path) => {
            let mut repo = SpriteRepository::new();
            if let Err(e) = repo.load_from_ron(Path::new(path)) {
                eprintln!("ERROR: Failed to load sprite manifest: {}", e);
                process::exit(1);
            }
            Some(repo)
        }
        None => None,
    };

    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_scripts(target, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }

    println!("Linting {} conversation file(s)", files.len());

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for path in &files {
        lint_file(path, sprites.as_ref(), &mut errors, &mut warnings);
    }

    println!("\n=== Conversation Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

fn collect_scripts(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_scripts(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
}

fn lint_file(
    path: &Path,
    sprites: Option<&SpriteRepository>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let label = path.display().to_string();
    let conversation: Conversation = match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(c) => c,
        Err(e) => {
            errors.push(format!("{}: {}", label, e));
            return;
        }
    };

    if let Err(e) = store::validate(&conversation) {
        errors.push(format!("{}: {}", label, e));
        return;
    }
    println!("  Checked: {}", label);

    for action in &conversation.actions {
        if let Err(e) = actions::validate(action) {
            warnings.push(format!("{}: {}", label, e));
        }
    }

    let used = lint_markup(&label, &conversation, errors, warnings);
    for action in &conversation.actions {
        let referenced = used.contains(action.name.as_str())
            || conversation.dialogues.iter().any(|d| {
                d.on_finished_action_names.contains(&action.name)
                    || d.options
                        .iter()
                        .any(|o| o.selected_action_names.contains(&action.name))
            });
        if !referenced {
            warnings.push(format!("{}: action '{}' is never used", label, action.name));
        }
    }

    for id in unreachable_dialogues(&conversation) {
        warnings.push(format!("{}: dialogue {} can never be reached", label, id));
    }

    if let Some(sprites) = sprites {
        for dialogue in &conversation.dialogues {
            if let Some(theme) = dialogue.theme() {
                if !sprites.has_theme(theme) {
                    warnings.push(format!(
                        "{}: dialogue {} uses theme '{}' with no sprites",
                        label, dialogue.id, theme
                    ));
                }
            }
            let Some(set) = dialogue.sprite_set() else {
                continue;
            };
            let sprite = dialogue.starting_sprite().unwrap_or("Default");
            if sprites.resolve_sprite(set, sprite).is_none() {
                errors.push(format!(
                    "{}: dialogue {} uses sprite '{}' missing from set '{}'",
                    label, dialogue.id, sprite, set
                ));
            }
        }
    }
}

/// Parse every sentence against a scratch store. Returns the action names
/// referenced by tags.
fn lint_markup(
    label: &str,
    conversation: &Conversation,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> FxHashSet<String> {
    let mut used = FxHashSet::default();
    let mut scratch = VariableStore::new();

    for dialogue in &conversation.dialogues {
        for sentence in &dialogue.sentences {
            let parsed = ParsedSentence::parse(sentence, &mut scratch);
            for issue in &parsed.issues {
                warnings.push(format!("{}: dialogue {}: {}", label, dialogue.id, issue));
            }
            for tag in &parsed.tags {
                let name = match &tag.command {
                    TagCommand::Action(name)
                    | TagCommand::ActionWithMessage { action: name, .. }
                    | TagCommand::ActionWithTarget { action: name, .. } => name,
                    _ => continue,
                };
                if conversation.action(name).is_none() {
                    errors.push(format!(
                        "{}: dialogue {} fires undeclared action '{}'",
                        label, dialogue.id, name
                    ));
                }
                used.insert(name.clone());
            }
            if parsed.text.trim().is_empty() {
                warnings.push(format!(
                    "{}: dialogue {} has a sentence with no visible text",
                    label, dialogue.id
                ));
            }
        }
    }
    used
}

/// Dialogue ids not reachable from any starting point.
fn unreachable_dialogues(conversation: &Conversation) -> Vec<i32> {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<i32> = conversation
        .dialogues
        .iter()
        .filter(|d| d.can_be_used_as_starting_point)
        .map(|d| d.id)
        .collect();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(dialogue) = conversation.dialogue(id) else {
            continue;
        };
        if dialogue.has_next() {
            stack.push(dialogue.next_id);
        }
        stack.extend(dialogue.options.iter().filter(|o| o.has_next()).map(|o| o.next_id));
    }

    let mut missing: Vec<i32> = conversation
        .dialogues
        .iter()
        .map(|d| d.id)
        .filter(|id| !seen.contains(id))
        .collect();
    missing.sort_unstable();
    missing
}
