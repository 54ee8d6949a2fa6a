//! User settings, stored apart from the catalog.
//!
//! Holds the saved image-URL list used by spin operations and the publish
//! credentials. Saving settings never touches the catalog document, so a
//! credential change cannot race with a bulk render.
//!
//! ```json
//! {
//!   "image_urls": ["https://cdn.example/1.png", "https://cdn.example/2.png"],
//!   "credentials": { "facebook_access_token": "…", "facebook_page_id": "1234" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Credentials {
    pub facebook_access_token: Option<String>,
    pub facebook_page_id: Option<String>,
}

impl Credentials {
    /// Token and page id, if both are set and non-blank.
    pub fn facebook(&self) -> Option<(&str, &str)> {
        let token = self.facebook_access_token.as_deref()?.trim();
        let page = self.facebook_page_id.as_deref()?.trim();
        if token.is_empty() || page.is_empty() {
            return None;
        }
        Some((token, page))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Image references that spin operations pick from.
    pub image_urls: Vec<String>,
    pub credentials: Credentials,
}

impl Settings {
    /// Replace the saved URL list with the non-blank lines of `text`, trimmed.
    pub fn set_image_urls(&mut self, text: &str) {
        self.image_urls = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
    }
}

/// Whole-document JSON store for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means default settings.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    }
}
