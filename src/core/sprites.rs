/// In-memory sprite sets for character portraits and UI themes.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::core::presenter::{SpriteRef, SpriteResolver};

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("sprite set needs a name")]
    EmptySetName,
    #[error("sprite in set '{0}' has an empty name")]
    EmptySpriteName(String),
    #[error("sprite '{sprite}' appears twice in set '{set}'")]
    DuplicateSprite { set: String, sprite: String },
    #[error("sprite '{sprite}' in set '{set}' has no image")]
    MissingImage { set: String, sprite: String },
}

/// One named image in a set, as written in RON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteEntry {
    pub name: String,
    pub image: String,
}

/// A file of sprite sets, as written in RON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpriteManifest {
    #[serde(default)]
    pub characters: FxHashMap<String, Vec<SpriteEntry>>,
    #[serde(default)]
    pub themes: FxHashMap<String, Vec<SpriteEntry>>,
}

type SpriteSet = FxHashMap<String, SpriteRef>;

#[derive(Debug, Default)]
pub struct SpriteRepository {
    characters: FxHashMap<String, SpriteSet>,
    themes: FxHashMap<String, SpriteSet>,
}

fn build_set(set: &str, entries: &[SpriteEntry]) -> Result<SpriteSet, SpriteError> {
    if set.trim().is_empty() {
        return Err(SpriteError::EmptySetName);
    }
    if entries.is_empty() {
        warn!(set, "sprite set is empty");
    }
    let mut seen = FxHashSet::default();
    let mut sprites = SpriteSet::default();
    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(SpriteError::EmptySpriteName(set.to_string()));
        }
        if entry.image.trim().is_empty() {
            return Err(SpriteError::MissingImage {
                set: set.to_string(),
                sprite: entry.name.clone(),
            });
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(SpriteError::DuplicateSprite {
                set: set.to_string(),
                sprite: entry.name.clone(),
            });
        }
        sprites.insert(entry.name.clone(), SpriteRef(entry.image.clone()));
    }
    Ok(sprites)
}

fn logged(err: SpriteError) -> SpriteError {
    error!("{}", err);
    err
}

impl SpriteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a character set, replacing one of the same name.
    pub fn register_character_set(
        &mut self,
        set: &str,
        entries: &[SpriteEntry],
    ) -> Result<(), SpriteError> {
        let sprites = build_set(set, entries).map_err(logged)?;
        if self.characters.insert(set.to_string(), sprites).is_some() {
            warn!(set, "character sprite set overwritten");
        }
        Ok(())
    }

    pub fn register_theme(&mut self, theme: &str, entries: &[SpriteEntry]) -> Result<(), SpriteError> {
        let sprites = build_set(theme, entries).map_err(logged)?;
        if self.themes.insert(theme.to_string(), sprites).is_some() {
            warn!(theme, "theme sprite set overwritten");
        }
        Ok(())
    }

    pub fn load_from_ron(&mut self, path: &Path) -> Result<(), SpriteError> {
        let contents = std::fs::read_to_string(path)?;
        self.parse_ron(&contents)
    }

    pub fn parse_ron(&mut self, contents: &str) -> Result<(), SpriteError> {
        let manifest: SpriteManifest = ron::from_str(contents)?;
        for (set, entries) in &manifest.characters {
            self.register_character_set(set, entries)?;
        }
        for (theme, entries) in &manifest.themes {
            self.register_theme(theme, entries)?;
        }
        Ok(())
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.contains_key(theme)
    }
}

fn lookup(sets: &FxHashMap<String, SpriteSet>, what: &str, set: &str, sprite: &str) -> Option<SpriteRef> {
    if set.is_empty() {
        debug!("no {} set named, nothing to resolve", what);
        return None;
    }
    let Some(sprites) = sets.get(set) else {
        error!(set, "{} set is not registered", what);
        return None;
    };
    let found = sprites.get(sprite).cloned();
    if found.is_none() {
        warn!(set, sprite, "{} sprite not found", what);
    }
    found
}

impl SpriteResolver for SpriteRepository {
    fn resolve_sprite(&self, set: &str, sprite: &str) -> Option<SpriteRef> {
        lookup(&self.characters, "character", set, sprite)
    }

    fn resolve_theme_sprite(&self, theme: &str, element: &str) -> Option<SpriteRef> {
        lookup(&self.themes, "theme", theme, element)
    }
}
