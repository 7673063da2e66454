/// Main conversation playback: start-point selection, sentence/option/next
/// navigation, and tag effects on the main channel.

use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::actions::{self, ActionOverride, ControlRequest, MessageSink};
use crate::core::condition;
use crate::core::config::EngineConfig;
use crate::core::presenter::{Channel, Presenter, SentenceView, SpriteRef, SpriteResolver};
use crate::core::reveal::{Reveal, Step};
use crate::core::session::SessionEvent;
use crate::core::tags::{ParsedSentence, TagCommand};
use crate::core::variables::VariableStore;
use crate::schema::action::ActionType;
use crate::schema::conversation::{Conversation, Dialogue};

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("conversation '{0}' is not registered")]
    ConversationNotFound(String),
    #[error("a conversation is already running")]
    AlreadyActive,
    #[error("conversation '{0}' has no dialogue that can start it")]
    NoStartingPoint(String),
    #[error("dialogue {0} does not exist in the running conversation")]
    DialogueNotFound(i32),
    #[error("no options are being shown")]
    NoOptions,
    #[error("an option must be selected first")]
    AwaitingOption,
    #[error("option {index} is out of range, {count} shown")]
    OptionOutOfRange { index: usize, count: usize },
    #[error("the current sentence is still being revealed")]
    StillRevealing,
}

/// Borrowed collaborators an engine acts through.
pub struct Services<'a> {
    pub variables: &'a mut VariableStore,
    pub presenter: &'a mut dyn Presenter,
    pub sprites: &'a dyn SpriteResolver,
    pub messages: &'a mut dyn MessageSink,
    pub config: &'a EngineConfig,
    /// Requests for the session to carry out after the current call.
    pub requests: &'a mut Vec<ControlRequest>,
    pub events: &'a mut Vec<SessionEvent>,
}

/// Engine-specific follow-up to a tag the shared handler could not finish.
pub(crate) enum TagOutcome {
    Done,
    Request(ControlRequest),
    HideSprite,
    ChangeSprite(Option<SpriteRef>),
    ChangeTheme(String),
}

fn run_action(
    conversation: &Conversation,
    name: &str,
    extra: ActionOverride<'_>,
    messages: &mut dyn MessageSink,
) -> TagOutcome {
    match actions::perform_named(conversation, name, extra, messages) {
        Ok(Some(request)) => TagOutcome::Request(request),
        _ => TagOutcome::Done,
    }
}

/// Effects common to main and background playback.
pub(crate) fn apply_tag(
    command: TagCommand,
    reveal: &mut Reveal,
    conversation: &Conversation,
    svc: &mut Services<'_>,
) -> TagOutcome {
    match command {
        TagCommand::Speed(multiplier) => reveal.set_speed(multiplier),
        TagCommand::Wait(seconds) => reveal.pause(seconds),
        TagCommand::RemoveVariable(name) => {
            let _ = svc.variables.remove(&name);
        }
        TagCommand::Log(text) => actions::log_script(ActionType::Log, &text),
        TagCommand::LogWarning(text) => actions::log_script(ActionType::LogWarning, &text),
        TagCommand::LogError(text) => actions::log_script(ActionType::LogError, &text),
        TagCommand::SendMessage { target, message } => {
            if message.trim().is_empty() {
                warn!(target = %target, "sendmessage tag without a message, skipping");
            } else if let Err(e) = svc.messages.deliver_message(&target, &message) {
                error!("{}", e);
            }
        }
        TagCommand::Action(name) => return run_action(conversation, &name, ActionOverride::None, svc.messages),
        TagCommand::ActionWithMessage { action: name, message } => {
            return run_action(conversation, &name, ActionOverride::Message(&message), svc.messages)
        }
        TagCommand::ActionWithTarget { action: name, target } => {
            return run_action(conversation, &name, ActionOverride::Target(&target), svc.messages)
        }
        TagCommand::CloseBackgroundConversations => {
            return TagOutcome::Request(ControlRequest::CloseBackgroundConversations)
        }
        TagCommand::StartBackgroundConversation(name) => {
            return TagOutcome::Request(ControlRequest::StartBackgroundConversation(name))
        }
        TagCommand::HideSprite => return TagOutcome::HideSprite,
        TagCommand::ChangeSprite { set, sprite } => {
            return TagOutcome::ChangeSprite(svc.sprites.resolve_sprite(&set, &sprite))
        }
        TagCommand::ChangeTheme(theme) => return TagOutcome::ChangeTheme(theme),
    }
    TagOutcome::Done
}

/// Highest-id dialogue marked as a starting point whose conditions hold.
pub(crate) fn find_starting_point(
    conversation: &Conversation,
    variables: &VariableStore,
) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (index, dialogue) in conversation.dialogues.iter().enumerate() {
        if !dialogue.can_be_used_as_starting_point {
            continue;
        }
        if best.is_some_and(|(_, id)| dialogue.id <= id) {
            continue;
        }
        if condition::all_hold(&dialogue.start_conditions, variables) {
            best = Some((index, dialogue.id));
        }
    }
    best.map(|(index, _)| index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// A sentence is revealing or waiting for `next`.
    Active,
    ShowingOptions,
}

/// Plays one conversation at a time on the main channel.
#[derive(Debug)]
pub struct ConversationEngine {
    state: PlaybackState,
    name: String,
    conversation: Option<Rc<Conversation>>,
    dialogue: usize,
    sentence: Option<usize>,
    last_speaker: Option<String>,
    current_theme: Option<String>,
    reveal: Option<Reveal>,
    text: String,
    first_sentence: bool,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationEngine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            name: String::new(),
            conversation: None,
            dialogue: 0,
            sentence: None,
            last_speaker: None,
            current_theme: None,
            reveal: None,
            text: String::new(),
            first_sentence: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != PlaybackState::Idle
    }

    /// Name of the running conversation.
    pub fn conversation_name(&self) -> Option<&str> {
        self.conversation.as_ref().map(|_| self.name.as_str())
    }

    pub fn current_dialogue(&self) -> Option<&Dialogue> {
        self.conversation
            .as_ref()
            .and_then(|c| c.dialogues.get(self.dialogue))
    }

    pub fn sentence_index(&self) -> Option<usize> {
        self.sentence
    }

    pub fn current_theme(&self) -> Option<&str> {
        self.current_theme.as_deref()
    }

    pub fn is_revealing(&self) -> bool {
        self.reveal.is_some()
    }

    /// Visible text of the current sentence.
    pub fn current_text(&self) -> Option<&str> {
        self.is_active().then_some(self.text.as_str())
    }

    pub fn speed_multiplier(&self) -> Option<f32> {
        self.reveal.as_ref().map(Reveal::speed)
    }

    pub fn start(
        &mut self,
        name: &str,
        conversation: Rc<Conversation>,
        svc: &mut Services<'_>,
    ) -> Result<(), PlaybackError> {
        if self.is_active() {
            let err = PlaybackError::AlreadyActive;
            warn!(conversation = name, "cannot start: {}", err);
            return Err(err);
        }
        let Some(start) = find_starting_point(&conversation, svc.variables) else {
            let err = PlaybackError::NoStartingPoint(name.to_string());
            error!("{}", err);
            return Err(err);
        };

        info!(conversation = name, dialogue = conversation.dialogues[start].id, "starting conversation");
        self.name = name.to_string();
        self.conversation = Some(conversation);
        self.dialogue = start;
        self.sentence = None;
        self.last_speaker = None;
        self.first_sentence = true;
        self.state = PlaybackState::Active;
        svc.events.push(SessionEvent::ConversationStarted(name.to_string()));
        self.advance(svc);
        Ok(())
    }

    /// Advance past a fully revealed sentence. Silent no-op when idle.
    pub fn next(&mut self, svc: &mut Services<'_>) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Idle => Ok(()),
            PlaybackState::ShowingOptions => {
                let err = PlaybackError::AwaitingOption;
                warn!("next() ignored: {}", err);
                Err(err)
            }
            PlaybackState::Active => {
                if self.reveal.is_some() {
                    let err = PlaybackError::StillRevealing;
                    warn!("next() ignored: {}", err);
                    return Err(err);
                }
                self.advance(svc);
                Ok(())
            }
        }
    }

    pub fn select_option(&mut self, index: usize, svc: &mut Services<'_>) -> Result<(), PlaybackError> {
        if self.state == PlaybackState::Idle {
            return Ok(());
        }
        if self.state != PlaybackState::ShowingOptions {
            let err = PlaybackError::NoOptions;
            warn!("cannot select option {}: {}", index, err);
            return Err(err);
        }
        let Some(conversation) = self.conversation.clone() else {
            return Ok(());
        };
        let options = &conversation.dialogues[self.dialogue].options;
        let Some(option) = options.get(index) else {
            let err = PlaybackError::OptionOutOfRange {
                index,
                count: options.len(),
            };
            warn!("{}", err);
            return Err(err);
        };

        debug!(option = %option.text, "option selected");
        self.state = PlaybackState::Active;
        for name in &option.selected_action_names {
            self.perform_action(&conversation, name, svc);
            if !self.is_active() {
                return Ok(());
            }
        }
        if option.has_next() {
            self.go_to(option.next_id, svc)
        } else {
            self.stop(svc);
            Ok(())
        }
    }

    /// Close the conversation. Safe to call when idle.
    pub fn stop(&mut self, svc: &mut Services<'_>) {
        if self.state == PlaybackState::Idle {
            return;
        }
        info!(conversation = %self.name, "conversation ended");
        self.state = PlaybackState::Idle;
        self.reveal = None;
        self.conversation = None;
        self.sentence = None;
        self.text.clear();
        svc.presenter.close(Channel::Main);
        svc.events.push(SessionEvent::ConversationEnded(std::mem::take(&mut self.name)));
    }

    pub fn change_theme(&mut self, theme: &str, svc: &mut Services<'_>) {
        debug!(theme, "theme changed");
        self.current_theme = Some(theme.to_string());
        svc.presenter.apply_theme(theme);
        svc.events.push(SessionEvent::ThemeChanged(theme.to_string()));
    }

    /// Let `dt` seconds of reveal time pass.
    pub fn tick(&mut self, dt: f32, svc: &mut Services<'_>) {
        match self.reveal.as_mut() {
            Some(reveal) => reveal.elapse(dt),
            None => return,
        }
        loop {
            let (Some(reveal), Some(conversation)) = (self.reveal.as_mut(), self.conversation.clone()) else {
                return;
            };
            match reveal.step() {
                Step::Waiting => return,
                Step::Character => svc.presenter.reveal_next_character(Channel::Main),
                Step::Tag(command) => {
                    let outcome = apply_tag(command, reveal, &conversation, svc);
                    self.finish_tag(outcome, svc);
                    if !self.is_active() {
                        return;
                    }
                }
                Step::Finished => {
                    self.reveal = None;
                    svc.presenter.sentence_revealed(Channel::Main);
                    if conversation.dialogues[self.dialogue].auto_proceed {
                        self.advance(svc);
                    }
                    return;
                }
            }
        }
    }

    fn finish_tag(&mut self, outcome: TagOutcome, svc: &mut Services<'_>) {
        match outcome {
            TagOutcome::Done => {}
            TagOutcome::Request(request) => self.handle_request(request, svc),
            TagOutcome::HideSprite => svc.presenter.change_character_sprite(Channel::Main, None),
            TagOutcome::ChangeSprite(sprite) => {
                if sprite.is_some() {
                    svc.presenter.change_character_sprite(Channel::Main, sprite.as_ref());
                }
            }
            TagOutcome::ChangeTheme(theme) => self.change_theme(&theme, svc),
        }
    }

    /// Main-channel requests are handled inline; the rest go to the session.
    fn handle_request(&mut self, request: ControlRequest, svc: &mut Services<'_>) {
        match request {
            ControlRequest::CloseConversation => self.stop(svc),
            ControlRequest::ChangeTheme(theme) => self.change_theme(&theme, svc),
            other => svc.requests.push(other),
        }
    }

    fn perform_action(&mut self, conversation: &Conversation, name: &str, svc: &mut Services<'_>) {
        if let Ok(Some(request)) =
            actions::perform_named(conversation, name, ActionOverride::None, svc.messages)
        {
            self.handle_request(request, svc);
        }
    }

    fn go_to(&mut self, id: i32, svc: &mut Services<'_>) -> Result<(), PlaybackError> {
        let Some(index) = self.conversation.as_ref().and_then(|c| c.dialogue_index(id)) else {
            let err = PlaybackError::DialogueNotFound(id);
            error!("{}", err);
            self.stop(svc);
            return Err(err);
        };
        self.dialogue = index;
        self.sentence = None;
        self.advance(svc);
        Ok(())
    }

    /// Next sentence, else options, else next dialogue, else finish.
    fn advance(&mut self, svc: &mut Services<'_>) {
        let Some(conversation) = self.conversation.clone() else {
            return;
        };
        let dialogue = &conversation.dialogues[self.dialogue];
        let next_sentence = self.sentence.map_or(0, |s| s + 1);

        if next_sentence < dialogue.sentences.len() {
            self.sentence = Some(next_sentence);
            self.show_sentence(dialogue, &dialogue.sentences[next_sentence], svc);
            return;
        }
        if !dialogue.options.is_empty() {
            self.state = PlaybackState::ShowingOptions;
            svc.presenter.show_options(&dialogue.options);
            return;
        }
        if dialogue.has_next() {
            let _ = self.go_to(dialogue.next_id, svc);
            return;
        }
        for name in &dialogue.on_finished_action_names {
            self.perform_action(&conversation, name, svc);
            if !self.is_active() {
                return;
            }
        }
        self.stop(svc);
    }

    fn show_sentence(&mut self, dialogue: &Dialogue, raw: &str, svc: &mut Services<'_>) {
        let speaker = dialogue.speaker();
        let same_speaker = !self.first_sentence && self.last_speaker.as_deref() == speaker;
        self.last_speaker = speaker.map(str::to_string);

        if let Some(theme) = dialogue.theme() {
            if self.current_theme.as_deref() != Some(theme) {
                self.change_theme(theme, svc);
            }
        }

        let parsed = ParsedSentence::parse(raw, svc.variables);
        svc.presenter.show_sentence(
            Channel::Main,
            &SentenceView {
                text: &parsed.text,
                speaker,
                same_speaker,
                auto_proceed: dialogue.auto_proceed,
            },
        );
        if !same_speaker {
            svc.presenter.set_speaker_name(Channel::Main, speaker.unwrap_or_default());
            let sprite = dialogue.sprite_set().and_then(|set| {
                let name = dialogue
                    .starting_sprite()
                    .unwrap_or(svc.config.default_sprite_name.as_str());
                svc.sprites.resolve_sprite(set, name)
            });
            svc.presenter.change_character_sprite(Channel::Main, sprite.as_ref());
        }

        let timings = &svc.config.timings;
        let initial = if self.first_sentence {
            timings.first_sentence_delay
        } else {
            0.0
        };
        self.first_sentence = false;
        self.text = parsed.text.clone();
        self.reveal = Some(Reveal::new(parsed, timings.char_delay, initial));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::{Comparison, Condition, ConditionVariable};

    fn gated(id: i32, threshold: i32) -> Dialogue {
        let mut dialogue = Dialogue::new(id);
        dialogue.can_be_used_as_starting_point = true;
        dialogue.sentences.push(format!("dialogue {}", id));
        dialogue.start_conditions.push(Condition::new(
            ConditionVariable::from_store("visits"),
            Comparison::GreaterOrEqual,
            ConditionVariable::literal(&threshold.to_string(), "int"),
        ));
        dialogue
    }

    fn conversation() -> Conversation {
        let mut open = Dialogue::new(0);
        open.can_be_used_as_starting_point = true;
        let mut middle = Dialogue::new(1);
        middle.can_be_used_as_starting_point = false;
        Conversation {
            dialogues: vec![open, middle, gated(7, 3), gated(4, 1)],
            ..Conversation::default()
        }
    }

    #[test]
    fn highest_passing_id_wins() {
        let conversation = conversation();
        let mut vars = VariableStore::new();
        assert_eq!(find_starting_point(&conversation, &vars), Some(0));

        vars.register("visits", 1);
        assert_eq!(find_starting_point(&conversation, &vars), Some(3));

        vars.register("visits", 5);
        assert_eq!(find_starting_point(&conversation, &vars), Some(2));
    }

    #[test]
    fn no_starting_point() {
        let conversation = Conversation {
            dialogues: vec![gated(2, 10)],
            ..Conversation::default()
        };
        assert_eq!(find_starting_point(&conversation, &VariableStore::new()), None);
    }

    #[test]
    fn idle_engine_reports_nothing() {
        let engine = ConversationEngine::new();
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.conversation_name().is_none());
        assert!(engine.current_text().is_none());
        assert!(engine.speed_multiplier().is_none());
    }
}
