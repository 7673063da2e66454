//! Dialogue Engine: a branching conversation interpreter for games.
//!
//! Conversations are JSON graphs of dialogues, options, and named actions.
//! Sentences carry inline markup that changes reveal speed, fires actions,
//! and reads or writes typed variables as the text is typed out. The game
//! supplies rendering, sprite lookup, and message delivery through traits.

pub mod core;
pub mod schema;

pub use crate::core::actions::{ActionError, ControlRequest, DeliveryError, MessageSink};
pub use crate::core::config::{EngineConfig, RevealTimings};
pub use crate::core::engine::{PlaybackError, PlaybackState};
pub use crate::core::presenter::{
    BackgroundId, Channel, Presenter, SentenceView, SpriteRef, SpriteResolver,
};
pub use crate::core::session::{Session, SessionBuilder, SessionError, SessionEvent};
pub use crate::core::store::{ConversationStore, LoadError, ValidationError};
pub use crate::core::variables::{VariableEvent, VariableStore};
pub use crate::schema::value::{Value, VariableKind};
