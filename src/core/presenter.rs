/// Boundary between the interpreter and whatever draws the conversation.

use crate::schema::conversation::DialogueOption;

/// Identifies one running background conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackgroundId(pub u64);

/// Which text box a presenter call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Main,
    Background(BackgroundId),
}

/// Opaque handle to an image, as handed out by a [`SpriteResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpriteRef(pub String);

/// Everything a presenter needs to lay out a sentence before reveal starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentenceView<'a> {
    /// Visible text with markup removed.
    pub text: &'a str,
    pub speaker: Option<&'a str>,
    /// Same speaker as the previous sentence; the name plate and sprite stay put.
    pub same_speaker: bool,
    pub auto_proceed: bool,
}

/// Rendering callbacks. Only `show_sentence`, `reveal_next_character`
/// and `close` are required.
pub trait Presenter {
    fn show_sentence(&mut self, channel: Channel, sentence: &SentenceView<'_>);

    /// Make one more character of the current sentence visible.
    fn reveal_next_character(&mut self, channel: Channel);

    /// The whole sentence is visible.
    fn sentence_revealed(&mut self, channel: Channel) {
        let _ = channel;
    }

    fn set_speaker_name(&mut self, channel: Channel, name: &str) {
        let _ = (channel, name);
    }

    fn show_options(&mut self, options: &[DialogueOption]) {
        let _ = options;
    }

    /// `None` hides the portrait.
    fn change_character_sprite(&mut self, channel: Channel, sprite: Option<&SpriteRef>) {
        let _ = (channel, sprite);
    }

    fn apply_theme(&mut self, theme: &str) {
        let _ = theme;
    }

    fn move_to_anchor(&mut self, channel: Channel, anchor: &str) {
        let _ = (channel, anchor);
    }

    fn close(&mut self, channel: Channel);
}

/// Looks up images by name. Misses are not fatal.
pub trait SpriteResolver {
    fn resolve_sprite(&self, set: &str, sprite: &str) -> Option<SpriteRef>;

    fn resolve_theme_sprite(&self, theme: &str, element: &str) -> Option<SpriteRef> {
        let _ = (theme, element);
        None
    }
}

/// Presenter that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn show_sentence(&mut self, _channel: Channel, _sentence: &SentenceView<'_>) {}
    fn reveal_next_character(&mut self, _channel: Channel) {}
    fn close(&mut self, _channel: Channel) {}
}
