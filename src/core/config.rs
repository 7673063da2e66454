/// Engine configuration: reveal timings and presentation defaults, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-character and transition delays, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealTimings {
    /// Delay between characters in the main conversation.
    pub char_delay: f32,
    /// Extra delay before the first sentence of a main conversation.
    pub first_sentence_delay: f32,
    /// Delay between characters in background conversations.
    pub background_char_delay: f32,
    /// Delay before each background sentence starts revealing.
    pub background_start_delay: f32,
    /// Extra delay when a background dialogue moves to a new anchor.
    pub anchor_change_delay: f32,
    /// Hold time after a background sentence finishes.
    pub background_end_delay: f32,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            char_delay: 0.035,
            first_sentence_delay: 0.3,
            background_char_delay: 0.1,
            background_start_delay: 0.4,
            anchor_change_delay: 0.4,
            background_end_delay: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `tracing_subscriber::EnvFilter` directive used by the bundled tools.
    pub log_level: String,
    /// Sprite shown when a dialogue names a sprite set but no starting sprite.
    pub default_sprite_name: String,
    pub timings: RevealTimings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_sprite_name: "Default".to_string(),
            timings: RevealTimings::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timings;
        let delays = [
            ("char_delay", t.char_delay),
            ("first_sentence_delay", t.first_sentence_delay),
            ("background_char_delay", t.background_char_delay),
            ("background_start_delay", t.background_start_delay),
            ("anchor_change_delay", t.anchor_change_delay),
            ("background_end_delay", t.background_end_delay),
        ];
        for (name, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDelay(name, value));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("timing '{0}' must be a non-negative number of seconds, found {1}")]
    InvalidDelay(&'static str, f32),
}
