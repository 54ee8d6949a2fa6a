//! Workspace configuration.
//!
//! A workspace is one directory holding `config.toml`, the catalog, the
//! settings document, and the template/output/upload directories. Every
//! relative path in the config resolves against that directory.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! generated = "generated"     # Rendered PNG artifacts
//! templates = "templates"     # *.html templates
//! uploads = "uploads"         # Images attached to records
//! catalog = "db.json"         # Artifact catalog document
//! settings = "settings.json"  # Saved image URLs and credentials
//! csv_dir = "csv"             # Directory touched by `respin-csv`
//!
//! [render]
//! width = 1280
//! height = 720
//! timeout_secs = 60
//! # base_url = "http://localhost:8080/"
//! # chrome_path = "/usr/bin/chromium"
//!
//! [publish]
//! graph_api_version = "v19.0"
//! utc_offset_minutes = 360    # Schedules are wall-clock times at this offset
//! min_lead_minutes = 10
//! request_timeout_secs = 60
//! video_timeout_secs = 600
//! ```
//!
//! Unknown keys are rejected to catch typos early. A missing `config.toml`
//! means all defaults.

use crate::render::Viewport;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Workspace configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub render: RenderConfig,
    pub publish: PublishConfig,
}

/// File and directory locations, relative to the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub generated: String,
    pub templates: String,
    pub uploads: String,
    pub catalog: String,
    pub settings: String,
    pub csv_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            generated: "generated".into(),
            templates: "templates".into(),
            uploads: "uploads".into(),
            catalog: "db.json".into(),
            settings: "settings.json".into(),
            csv_dir: "csv".into(),
        }
    }
}

/// Rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Upper bound for one render, in seconds.
    pub timeout_secs: u64,
    /// Injected as `<base href>` so relative asset URLs resolve.
    pub base_url: Option<String>,
    /// Browser binary; auto-detected when absent.
    pub chrome_path: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            timeout_secs: 60,
            base_url: None,
            chrome_path: None,
        }
    }
}

impl RenderConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub graph_api_version: String,
    /// Offset of the wall clock that schedules are written in.
    pub utc_offset_minutes: i32,
    /// Scheduled posts must be at least this far in the future.
    pub min_lead_minutes: u32,
    pub request_timeout_secs: u64,
    /// Video uploads get a longer timeout than other requests.
    pub video_timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            graph_api_version: "v19.0".into(),
            utc_offset_minutes: 6 * 60,
            min_lead_minutes: 10,
            request_timeout_secs: 60,
            video_timeout_secs: 600,
        }
    }
}

impl PublishConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Validation(format!(
                "publish.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    pub fn min_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.min_lead_minutes))
    }
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Validation(
                "render.width and render.height must be non-zero".into(),
            ));
        }
        if self.render.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "render.timeout_secs must be non-zero".into(),
            ));
        }
        let p = &self.paths;
        for (key, value) in [
            ("generated", &p.generated),
            ("templates", &p.templates),
            ("uploads", &p.uploads),
            ("catalog", &p.catalog),
            ("settings", &p.settings),
            ("csv_dir", &p.csv_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "paths.{key} must not be empty"
                )));
            }
        }
        if self.publish.graph_api_version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "publish.graph_api_version must not be empty".into(),
            ));
        }
        self.publish.offset()?;
        Ok(())
    }

    /// Absolute locations for every configured path under `root`.
    pub fn resolve_paths(&self, root: &Path) -> WorkspacePaths {
        let p = &self.paths;
        WorkspacePaths {
            generated: root.join(&p.generated),
            templates: root.join(&p.templates),
            uploads: root.join(&p.uploads),
            catalog: root.join(&p.catalog),
            settings: root.join(&p.settings),
            csv_dir: root.join(&p.csv_dir),
        }
    }
}

/// Resolved workspace locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub generated: PathBuf,
    pub templates: PathBuf,
    pub uploads: PathBuf,
    pub catalog: PathBuf,
    pub settings: PathBuf,
    pub csv_dir: PathBuf,
}

/// Load config from `config.toml` in the given directory.
///
/// A missing file yields defaults. Unknown keys are rejected and the result
/// is validated.
pub fn load_config(root: &Path) -> Result<AppConfig, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# thumbforge configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.
# Relative paths resolve against the directory holding this file.

# ---------------------------------------------------------------------------
# Locations
# ---------------------------------------------------------------------------
[paths]
# Rendered PNG artifacts.
generated = "generated"

# HTML templates (*.html).
templates = "templates"

# Images attached to individual records.
uploads = "uploads"

# Artifact catalog document (records + library).
catalog = "db.json"

# Saved image URLs and publish credentials.
settings = "settings.json"

# CSV files rewritten by `thumbforge respin-csv`.
csv_dir = "csv"

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# Output size in pixels.
width = 1280
height = 720

# A render taking longer than this is abandoned.
timeout_secs = 60

# Relative URLs in templates resolve against this, via <base href>.
# base_url = "http://localhost:8080/"

# Chrome/Chromium binary. Auto-detected when omitted.
# chrome_path = "/usr/bin/chromium"

# ---------------------------------------------------------------------------
# Publishing
# ---------------------------------------------------------------------------
[publish]
graph_api_version = "v19.0"

# Schedules ("YYYY-MM-DD HH:MM") are read as wall-clock time at this
# UTC offset. 360 = UTC+06:00 (Asia/Dhaka).
utc_offset_minutes = 360

# Scheduled posts must be at least this many minutes in the future.
min_lead_minutes = 10

# HTTP timeouts in seconds.
request_timeout_secs = 60
video_timeout_secs = 600
"##
}
