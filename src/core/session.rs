/// The top-level interpreter: owns the stores, the main engine, and every
/// running background engine, and routes requests between them.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::actions::{ControlRequest, MessageSink, NoMessageTargets};
use crate::core::background::BackgroundEngine;
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::engine::{ConversationEngine, PlaybackError, Services};
use crate::core::presenter::{BackgroundId, Channel, NullPresenter, Presenter, SpriteResolver};
use crate::core::sprites::{SpriteError, SpriteRepository};
use crate::core::store::{ConversationStore, LoadError};
use crate::core::variables::VariableStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("sprite error: {0}")]
    Sprite(#[from] SpriteError),
}

/// Notifications for the game, collected until drained.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConversationStarted(String),
    ConversationEnded(String),
    ThemeChanged(String),
    BackgroundStarted { id: BackgroundId, name: String },
    BackgroundFinished(BackgroundId),
}

/// Requests routed per call before giving up on a feedback loop.
const MAX_ROUTED_REQUESTS: usize = 64;

/// Built via `Session::builder()`.
pub struct Session {
    conversations: ConversationStore,
    variables: VariableStore,
    presenter: Box<dyn Presenter>,
    sprites: Box<dyn SpriteResolver>,
    messages: Box<dyn MessageSink>,
    config: EngineConfig,
    main: ConversationEngine,
    background: Vec<BackgroundEngine>,
    next_background: u64,
    requests: Vec<ControlRequest>,
    events: Vec<SessionEvent>,
}

pub struct SessionBuilder {
    conversations_dir: Option<String>,
    config_path: Option<String>,
    sprites_path: Option<String>,
    conversations: Option<ConversationStore>,
    variables: Option<VariableStore>,
    config: Option<EngineConfig>,
    presenter: Option<Box<dyn Presenter>>,
    sprites: Option<Box<dyn SpriteResolver>>,
    messages: Option<Box<dyn MessageSink>>,
}

/// Split borrows so an engine and the services it needs can be used together.
macro_rules! services {
    ($session:ident) => {
        Services {
            variables: &mut $session.variables,
            presenter: &mut *$session.presenter,
            sprites: &*$session.sprites,
            messages: &mut *$session.messages,
            config: &$session.config,
            requests: &mut $session.requests,
            events: &mut $session.events,
        }
    };
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder {
            conversations_dir: None,
            config_path: None,
            sprites_path: None,
            conversations: None,
            variables: None,
            config: None,
            presenter: None,
            sprites: None,
            messages: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn main(&self) -> &ConversationEngine {
        &self.main
    }

    pub fn background(&self, id: BackgroundId) -> Option<&BackgroundEngine> {
        self.background.iter().find(|b| b.id() == id)
    }

    pub fn background_count(&self) -> usize {
        self.background.len()
    }

    pub fn load_conversation(&mut self, name: &str, json: &str) -> Result<(), LoadError> {
        self.conversations.load(name, json)
    }

    /// Start `name` on whichever engine its type calls for.
    pub fn start_conversation(&mut self, name: &str) -> Result<Channel, PlaybackError> {
        let conversation = self
            .conversations
            .retrieve(name)
            .ok_or_else(|| PlaybackError::ConversationNotFound(name.to_string()))?;
        if conversation.is_background() {
            info!(conversation = name, "background conversation started as main; redirecting");
            return self.start_background_conversation(name);
        }
        let result = {
            let mut svc = services!(self);
            self.main.start(name, conversation, &mut svc)
        };
        self.route_requests();
        result.map(|_| Channel::Main)
    }

    /// Start `name` as ambient chatter. A main conversation is redirected.
    pub fn start_background_conversation(&mut self, name: &str) -> Result<Channel, PlaybackError> {
        let conversation = self
            .conversations
            .retrieve(name)
            .ok_or_else(|| PlaybackError::ConversationNotFound(name.to_string()))?;
        if !conversation.is_background() {
            info!(conversation = name, "main conversation started as background; redirecting");
            return self.start_conversation(name);
        }
        let id = BackgroundId(self.next_background);
        self.next_background += 1;
        let result = {
            let mut svc = services!(self);
            BackgroundEngine::start(id, name, conversation, &mut svc)
        };
        let engine = result?;
        if !engine.is_finished() {
            self.background.push(engine);
        }
        self.route_requests();
        Ok(Channel::Background(id))
    }

    pub fn next(&mut self) -> Result<(), PlaybackError> {
        let result = {
            let mut svc = services!(self);
            self.main.next(&mut svc)
        };
        self.route_requests();
        result
    }

    pub fn select_option(&mut self, index: usize) -> Result<(), PlaybackError> {
        let result = {
            let mut svc = services!(self);
            self.main.select_option(index, &mut svc)
        };
        self.route_requests();
        result
    }

    pub fn stop_conversation(&mut self) {
        let mut svc = services!(self);
        self.main.stop(&mut svc);
    }

    pub fn close_background_conversations(&mut self) {
        let mut svc = services!(self);
        for engine in &mut self.background {
            engine.finish(&mut svc);
        }
        self.background.clear();
    }

    /// Advance every engine by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        {
            let mut svc = services!(self);
            self.main.tick(dt, &mut svc);
            for engine in &mut self.background {
                engine.tick(dt, &mut svc);
            }
        }
        self.background.retain(|b| !b.is_finished());
        self.route_requests();
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn route_requests(&mut self) {
        let mut routed = 0;
        while !self.requests.is_empty() {
            let batch = std::mem::take(&mut self.requests);
            for request in batch {
                routed += 1;
                if routed > MAX_ROUTED_REQUESTS {
                    warn!("too many chained requests, dropping the rest");
                    self.requests.clear();
                    return;
                }
                debug!(?request, "routing request");
                match request {
                    ControlRequest::CloseConversation => self.stop_conversation(),
                    ControlRequest::ChangeTheme(theme) => {
                        let mut svc = services!(self);
                        self.main.change_theme(&theme, &mut svc);
                    }
                    ControlRequest::StartBackgroundConversation(name) => {
                        let _ = self.start_background_conversation(&name);
                    }
                    ControlRequest::CloseBackgroundConversations => {
                        self.close_background_conversations()
                    }
                }
            }
        }
    }
}

impl SessionBuilder {
    /// Load every `*.json` conversation in `path` at build time.
    pub fn conversations_dir(mut self, path: &str) -> Self {
        self.conversations_dir = Some(path.to_string());
        self
    }

    /// Read [`EngineConfig`] from a RON file at build time.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Load a RON sprite manifest into a [`SpriteRepository`] at build time.
    pub fn sprites_path(mut self, path: &str) -> Self {
        self.sprites_path = Some(path.to_string());
        self
    }

    pub fn with_conversations(mut self, conversations: ConversationStore) -> Self {
        self.conversations = Some(conversations);
        self
    }

    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Some(Box::new(presenter));
        self
    }

    pub fn sprites(mut self, sprites: impl SpriteResolver + 'static) -> Self {
        self.sprites = Some(Box::new(sprites));
        self
    }

    pub fn messages(mut self, messages: impl MessageSink + 'static) -> Self {
        self.messages = Some(Box::new(messages));
        self
    }

    pub fn build(self) -> Result<Session, SessionError> {
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(Path::new(path))?,
            (None, None) => EngineConfig::default(),
        };

        let mut conversations = self.conversations.unwrap_or_default();
        if let Some(ref dir) = self.conversations_dir {
            conversations.load_dir(Path::new(dir))?;
        }

        let sprites: Box<dyn SpriteResolver> = match (self.sprites, &self.sprites_path) {
            (Some(sprites), _) => sprites,
            (None, Some(path)) => {
                let mut repo = SpriteRepository::new();
                repo.load_from_ron(Path::new(path))?;
                Box::new(repo)
            }
            (None, None) => Box::new(SpriteRepository::new()),
        };

        Ok(Session {
            conversations,
            variables: self.variables.unwrap_or_default(),
            presenter: self.presenter.unwrap_or_else(|| Box::new(NullPresenter)),
            sprites,
            messages: self.messages.unwrap_or_else(|| Box::new(NoMessageTargets)),
            config,
            main: ConversationEngine::new(),
            background: Vec::new(),
            next_background: 0,
            requests: Vec::new(),
            events: Vec::new(),
        })
    }
}
