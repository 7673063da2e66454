/// Resumable character-by-character reveal of a parsed sentence.

use crate::core::tags::{ParsedSentence, TagCommand};

/// What the cursor wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Apply this tag before revealing any more text.
    Tag(TagCommand),
    /// Reveal one more character.
    Character,
    /// Every character and tag has been handled.
    Finished,
    /// Waiting for more time to pass.
    Waiting,
}

/// Walks a sentence in the order tags-at-i, then character i.
///
/// Time is banked: `elapse` adds to a budget that characters and waits
/// draw from, so a long tick reveals several characters at once.
#[derive(Debug, Clone)]
pub struct Reveal {
    sentence: ParsedSentence,
    char_count: usize,
    revealed: usize,
    next_tag: usize,
    delay: f32,
    char_delay: f32,
    speed: f32,
}

impl Reveal {
    pub fn new(sentence: ParsedSentence, char_delay: f32, initial_delay: f32) -> Self {
        let char_count = sentence.char_count();
        Self {
            sentence,
            char_count,
            revealed: 0,
            next_tag: 0,
            delay: initial_delay.max(0.0),
            char_delay,
            speed: 1.0,
        }
    }

    pub fn elapse(&mut self, dt: f32) {
        self.delay -= dt.max(0.0);
    }

    pub fn step(&mut self) -> Step {
        if self.delay > 0.0 {
            return Step::Waiting;
        }
        if let Some(tag) = self.sentence.tags.get(self.next_tag) {
            if tag.index <= self.revealed {
                self.next_tag += 1;
                return Step::Tag(tag.command.clone());
            }
        }
        if self.revealed < self.char_count {
            self.revealed += 1;
            self.delay += self.char_delay * self.speed;
            return Step::Character;
        }
        Step::Finished
    }

    /// Scale subsequent per-character delays. Negative values clamp to zero.
    pub fn set_speed(&mut self, multiplier: f32) {
        self.speed = multiplier.max(0.0);
    }

    pub fn pause(&mut self, seconds: f32) {
        self.delay += seconds.max(0.0);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn revealed(&self) -> usize {
        self.revealed
    }
}
