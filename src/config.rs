//! Settings for media localization.
//!
//! Configuration sources (highest priority first):
//! 1. `MEDIALOC_CONFIG` environment variable (path to a YAML file)
//! 2. Vault config file (`<vault>/.medialoc/config.yaml`)
//! 3. User config file (`~/.medialoc/config.yaml`)
//! 4. Built-in defaults
//!
//! The file is an unversioned key/value mapping. Unknown keys are ignored,
//! missing keys keep their defaults, and every present key is validated on
//! its own: a rejected value is logged and the previous value is kept.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MEDIALOC_CONFIG";

/// Upper bound on compiled include-pattern size
const INCLUDE_SIZE_LIMIT: usize = 1 << 20;

/// Placeholders understood by the filename template
pub const TEMPLATE_VARIABLES: &[&str] = &["note", "folder", "anchor", "date"];

/// A settings value rejected at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("'{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("'{key}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Include pattern '{pattern}' rejected: {reason}")]
    UnsafePattern { pattern: String, reason: String },

    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// How a localized reference is written back into the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStyle {
    /// `![[media/photo.png]]`
    #[default]
    Wiki,

    /// `![anchor](media/photo.png)`
    Markdown,
}

impl std::str::FromStr for LinkStyle {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wiki" | "wikilink" => Ok(LinkStyle::Wiki),
            "markdown" | "md" => Ok(LinkStyle::Markdown),
            _ => Err(ConfigurationError::InvalidValue {
                key: "link_style".to_string(),
                reason: format!("unknown style '{}'", s),
            }),
        }
    }
}

/// Process-wide settings snapshot.
///
/// The pipeline only ever reads a snapshot; changes go through
/// [`Settings::merge`] or [`Settings::update`], which produce a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Queue documents for processing when they are edited
    pub process_on_paste: bool,

    /// Drain interval for the edit queue (milliseconds)
    pub paste_interval_ms: u64,

    /// How many drains a queued document survives (1-100)
    pub paste_attempts: u32,

    /// Collapse `[![[file]](link)]` leftovers into `![[file]]`
    pub clean_malformed_tags: bool,

    /// Show notices for background processing
    pub show_notifications: bool,

    /// Regex a document path must match to be processed
    pub include: String,

    /// Vault-relative folder that receives media files
    pub media_root: String,

    /// Store each document's media in `<media_root>/<note name>`
    pub per_document_folder: bool,

    /// Template for media file base names
    pub name_template: String,

    /// strftime pattern used for `{{date}}`
    pub date_format: String,

    /// Output reference syntax
    pub link_style: LinkStyle,

    /// Per-request fetch timeout (seconds)
    pub fetch_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            process_on_paste: true,
            paste_interval_ms: 1000,
            paste_attempts: 3,
            clean_malformed_tags: true,
            show_notifications: false,
            include: r".*\.md$".to_string(),
            media_root: "media".to_string(),
            per_document_folder: false,
            name_template: "{{anchor}}".to_string(),
            date_format: "%Y%m%d".to_string(),
            link_style: LinkStyle::Wiki,
            fetch_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Overlay a raw mapping onto this snapshot, field by field.
    ///
    /// Returns the merged snapshot and every rejected value. Rejected fields
    /// keep the value they had in `self`.
    pub fn merge(&self, raw: &Mapping) -> (Settings, Vec<ConfigurationError>) {
        let mut next = self.clone();
        let mut errors = Vec::new();

        for (key, value) in raw {
            let Some(key) = key.as_str() else {
                continue;
            };
            match next.update(key, value) {
                Ok(updated) => next = updated,
                Err(e) => errors.push(e),
            }
        }

        (next, errors)
    }

    /// Produce a snapshot with one field changed, or reject the value.
    ///
    /// Unknown keys are ignored.
    pub fn update(&self, key: &str, value: &Value) -> Result<Settings, ConfigurationError> {
        let mut next = self.clone();

        match key {
            "process_on_paste" => next.process_on_paste = read_bool(key, value)?,
            "paste_interval_ms" => {
                next.paste_interval_ms = read_int(key, value, 0, i64::MAX)? as u64;
            }
            "paste_attempts" => next.paste_attempts = read_int(key, value, 1, 100)? as u32,
            "clean_malformed_tags" => next.clean_malformed_tags = read_bool(key, value)?,
            "show_notifications" => next.show_notifications = read_bool(key, value)?,
            "include" => {
                let pattern = read_string(key, value)?;
                compile_include(&pattern)?;
                next.include = pattern;
            }
            "media_root" => {
                let root = read_string(key, value)?;
                validate_media_root(&root)?;
                next.media_root = root.trim_matches('/').to_string();
            }
            "per_document_folder" => next.per_document_folder = read_bool(key, value)?,
            "name_template" => {
                let template = read_string(key, value)?;
                validate_template(&template)?;
                next.name_template = template;
            }
            "date_format" => {
                let format = read_string(key, value)?;
                validate_date_format(&format)?;
                next.date_format = format;
            }
            "link_style" => next.link_style = read_string(key, value)?.parse()?,
            "fetch_timeout_secs" => {
                next.fetch_timeout_secs = read_int(key, value, 1, 600)? as u64;
            }
            other => {
                tracing::debug!(key = other, "Ignoring unknown settings key");
            }
        }

        Ok(next)
    }

    /// Compiled include pattern
    pub fn include_regex(&self) -> Result<Regex, ConfigurationError> {
        compile_include(&self.include)
    }

    /// Whether a document path passes the include pattern
    pub fn includes(&self, path: &str) -> bool {
        self.include_regex()
            .map(|re| re.is_match(path))
            .unwrap_or(false)
    }
}

fn read_bool(key: &str, value: &Value) -> Result<bool, ConfigurationError> {
    value.as_bool().ok_or_else(|| ConfigurationError::WrongType {
        key: key.to_string(),
        expected: "a boolean",
    })
}

/// Integers may be given as numbers or as digit strings
fn read_int(key: &str, value: &Value, min: i64, max: i64) -> Result<i64, ConfigurationError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    let n = parsed.ok_or_else(|| ConfigurationError::WrongType {
        key: key.to_string(),
        expected: "an integer",
    })?;

    if n < min || n > max {
        return Err(ConfigurationError::OutOfRange {
            key: key.to_string(),
            value: n,
            min,
            max,
        });
    }

    Ok(n)
}

fn read_string(key: &str, value: &Value) -> Result<String, ConfigurationError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::WrongType {
            key: key.to_string(),
            expected: "a string",
        })
}

/// The regex engine matches in linear time, so only the compiled size
/// needs bounding.
fn compile_include(pattern: &str) -> Result<Regex, ConfigurationError> {
    if pattern.is_empty() {
        return Err(ConfigurationError::UnsafePattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }

    RegexBuilder::new(pattern)
        .size_limit(INCLUDE_SIZE_LIMIT)
        .build()
        .map_err(|e| ConfigurationError::UnsafePattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn validate_media_root(root: &str) -> Result<(), ConfigurationError> {
    let path = Path::new(root.trim_matches('/'));
    let escapes = root.starts_with('/')
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(ConfigurationError::InvalidValue {
            key: "media_root".to_string(),
            reason: "must be a path inside the vault".to_string(),
        });
    }
    Ok(())
}

fn validate_template(template: &str) -> Result<(), ConfigurationError> {
    let re = template_regex();
    for caps in re.captures_iter(template) {
        let name = caps[1].trim();
        if !TEMPLATE_VARIABLES.contains(&name) {
            return Err(ConfigurationError::InvalidValue {
                key: "name_template".to_string(),
                reason: format!(
                    "unknown variable '{{{{{}}}}}', expected one of {}",
                    name,
                    TEMPLATE_VARIABLES.join(", ")
                ),
            });
        }
    }
    Ok(())
}

fn validate_date_format(format: &str) -> Result<(), ConfigurationError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigurationError::InvalidDateFormat(format.to_string()));
    }
    Ok(())
}

/// Matches `{{ name }}` placeholders in the filename template
pub(crate) fn template_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").expect("template regex is valid"))
}

// ============================================================================
// Loading
// ============================================================================

/// Settings resolved for one vault
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute vault root
    pub vault: PathBuf,

    /// Config file the settings came from (if any)
    pub config_file: Option<PathBuf>,

    /// Effective settings
    pub settings: Settings,

    /// Values rejected while loading
    pub rejected: Vec<ConfigurationError>,
}

/// Find the config file for a vault
fn find_config_file(vault: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }

    let in_vault = vault.join(".medialoc").join("config.yaml");
    if in_vault.exists() {
        return Some(in_vault);
    }

    let in_home = dirs::home_dir()?.join(".medialoc").join("config.yaml");
    if in_home.exists() {
        return Some(in_home);
    }

    None
}

/// Load and parse a config file into a raw mapping
fn load_config_file(path: &Path) -> Result<Mapping> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => anyhow::bail!("Config file is not a mapping: {}", path.display()),
    }
}

/// Load settings for a vault from all sources
pub fn load_config(vault: &Path) -> Result<ResolvedConfig> {
    let vault = vault
        .canonicalize()
        .with_context(|| format!("Vault directory not found: {}", vault.display()))?;

    let config_file = find_config_file(&vault);

    let (settings, rejected) = match config_file {
        Some(ref path) => {
            let raw = load_config_file(path)?;
            Settings::default().merge(&raw)
        }
        None => (Settings::default(), Vec::new()),
    };

    for error in &rejected {
        tracing::warn!("Ignoring setting: {}", error);
    }

    Ok(ResolvedConfig {
        vault,
        config_file,
        settings,
        rejected,
    })
}
