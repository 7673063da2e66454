/// Background conversation playback: self-advancing ambient chatter that
/// follows `nextId` links and never waits for the player.

use std::rc::Rc;
use tracing::{debug, info};

use crate::core::actions::ControlRequest;
use crate::core::engine::{apply_tag, find_starting_point, PlaybackError, Services, TagOutcome};
use crate::core::presenter::{BackgroundId, Channel, SentenceView};
use crate::core::reveal::{Reveal, Step};
use crate::core::session::SessionEvent;
use crate::core::tags::ParsedSentence;
use crate::schema::conversation::Conversation;

#[derive(Debug)]
enum Phase {
    Revealing(Reveal),
    /// Sentence fully shown; counts down before moving on.
    Holding(f32),
    Finished,
}

/// One running background conversation.
#[derive(Debug)]
pub struct BackgroundEngine {
    id: BackgroundId,
    name: String,
    conversation: Rc<Conversation>,
    dialogue: usize,
    sentence: Option<usize>,
    anchor: Option<String>,
    anchor_moved: bool,
    last_speaker: Option<String>,
    phase: Phase,
}

impl BackgroundEngine {
    pub fn start(
        id: BackgroundId,
        name: &str,
        conversation: Rc<Conversation>,
        svc: &mut Services<'_>,
    ) -> Result<Self, PlaybackError> {
        let Some(start) = find_starting_point(&conversation, svc.variables) else {
            let err = PlaybackError::NoStartingPoint(name.to_string());
            tracing::error!("{}", err);
            return Err(err);
        };
        info!(conversation = name, id = id.0, "starting background conversation");

        let mut engine = Self {
            id,
            name: name.to_string(),
            conversation,
            dialogue: start,
            sentence: None,
            anchor: None,
            anchor_moved: false,
            last_speaker: None,
            phase: Phase::Finished,
        };
        svc.events.push(SessionEvent::BackgroundStarted {
            id,
            name: name.to_string(),
        });
        engine.enter_dialogue(start, true, svc);
        Ok(engine)
    }

    pub fn id(&self) -> BackgroundId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    pub fn current_dialogue_id(&self) -> Option<i32> {
        (!self.is_finished()).then(|| self.conversation.dialogues[self.dialogue].id)
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    fn channel(&self) -> Channel {
        Channel::Background(self.id)
    }

    /// Abandon playback immediately. Safe to call twice.
    pub fn finish(&mut self, svc: &mut Services<'_>) {
        if self.is_finished() {
            return;
        }
        debug!(conversation = %self.name, id = self.id.0, "background conversation finished");
        self.phase = Phase::Finished;
        svc.presenter.close(self.channel());
        svc.events.push(SessionEvent::BackgroundFinished(self.id));
    }

    pub fn tick(&mut self, dt: f32, svc: &mut Services<'_>) {
        match &mut self.phase {
            Phase::Finished => {}
            Phase::Holding(remaining) => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    self.advance(svc);
                }
            }
            Phase::Revealing(reveal) => {
                reveal.elapse(dt);
                self.run_reveal(svc);
            }
        }
    }

    fn run_reveal(&mut self, svc: &mut Services<'_>) {
        let channel = self.channel();
        let conversation = Rc::clone(&self.conversation);
        loop {
            let Phase::Revealing(reveal) = &mut self.phase else {
                return;
            };
            match reveal.step() {
                Step::Waiting => return,
                Step::Character => svc.presenter.reveal_next_character(channel),
                Step::Tag(command) => match apply_tag(command, reveal, &conversation, svc) {
                    TagOutcome::Done => {}
                    TagOutcome::Request(request) => {
                        if request == ControlRequest::CloseBackgroundConversations {
                            self.finish(svc);
                        }
                        svc.requests.push(request);
                    }
                    TagOutcome::HideSprite
                    | TagOutcome::ChangeSprite(_)
                    | TagOutcome::ChangeTheme(_) => {
                        debug!(id = self.id.0, "sprite and theme tags do nothing in background conversations");
                    }
                },
                Step::Finished => {
                    svc.presenter.sentence_revealed(channel);
                    self.phase = Phase::Holding(svc.config.timings.background_end_delay);
                    return;
                }
            }
        }
    }

    fn enter_dialogue(&mut self, index: usize, first: bool, svc: &mut Services<'_>) {
        self.dialogue = index;
        self.sentence = None;
        let anchor = self.conversation.dialogues[index].anchor().map(str::to_string);
        if let Some(anchor) = anchor {
            if self.anchor.as_deref() != Some(anchor.as_str()) {
                svc.presenter.move_to_anchor(self.channel(), &anchor);
                self.anchor_moved = !first;
                self.anchor = Some(anchor);
            }
        }
        self.advance(svc);
    }

    /// Next sentence, else follow `nextId`, else finish.
    fn advance(&mut self, svc: &mut Services<'_>) {
        let conversation = Rc::clone(&self.conversation);
        let dialogue = &conversation.dialogues[self.dialogue];
        let next_sentence = self.sentence.map_or(0, |s| s + 1);

        if next_sentence < dialogue.sentences.len() {
            self.sentence = Some(next_sentence);
            let parsed = ParsedSentence::parse(&dialogue.sentences[next_sentence], svc.variables);
            let speaker = dialogue.speaker();
            let same_speaker = self.last_speaker.is_some() && self.last_speaker.as_deref() == speaker;
            self.last_speaker = speaker.map(str::to_string);
            svc.presenter.show_sentence(
                self.channel(),
                &SentenceView {
                    text: &parsed.text,
                    speaker,
                    same_speaker,
                    auto_proceed: true,
                },
            );

            let timings = &svc.config.timings;
            let mut delay = timings.background_start_delay;
            if std::mem::take(&mut self.anchor_moved) {
                delay += timings.anchor_change_delay;
            }
            self.phase = Phase::Revealing(Reveal::new(parsed, timings.background_char_delay, delay));
            return;
        }

        if dialogue.has_next() {
            if let Some(index) = conversation.dialogue_index(dialogue.next_id) {
                self.enter_dialogue(index, false, svc);
                return;
            }
            tracing::error!(
                "{}",
                PlaybackError::DialogueNotFound(dialogue.next_id)
            );
        }
        self.finish(svc);
    }
}
