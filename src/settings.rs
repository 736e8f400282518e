//! Tagger settings: the `[tagger]` table of the configuration, coerced into a
//! typed value that is handed to the matcher and the synchronizer.
//!
//! Nothing in here fails on a malformed table. Every key that is missing or
//! has an unusable type falls back to the packaged defaults.

use crate::error::AppError;
use crate::matcher::MatchConfig;
use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_NEED_IMAGE_TAG: &str = "NeedImage";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// The shipped defaults, compiled into the binary so a missing config
/// directory still yields a usable keyword list.
pub const PACKAGED_DEFAULTS: &str = include_str!("../config/default.toml");

const MAX_MIN_HITS: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggerSettings {
    pub need_image_tag: String,
    pub keywords: Vec<String>,
    pub min_keyword_hits: u32,
    pub case_sensitive: bool,
    pub use_regex: bool,
    pub remove_tag_if_resolved: bool,
}

impl Default for TaggerSettings {
    // Last resort when even the embedded defaults cannot be read. Keep in
    // sync with config/default.toml.
    fn default() -> Self {
        Self {
            need_image_tag: DEFAULT_NEED_IMAGE_TAG.to_string(),
            keywords: ["ct", "mri", "x-ray", "xray", "ultrasound", "echo", "ecg", "ekg"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            min_keyword_hits: 1,
            case_sensitive: false,
            use_regex: true,
            remove_tag_if_resolved: true,
        }
    }
}

impl TaggerSettings {
    pub fn packaged_defaults() -> Self {
        match load_packaged_table() {
            Ok(table) => Self::from_value(&table, &Self::default()),
            Err(e) => {
                log::warn!("Packaged defaults unreadable, using built-in values: {}", e);
                Self::default()
            }
        }
    }

    /// Coerces a raw `[tagger]` table, key by key, falling back to `defaults`.
    pub fn from_value(raw: &Value, defaults: &TaggerSettings) -> Self {
        let table = match raw {
            Value::Object(table) => table,
            Value::Null => return defaults.clone(),
            other => {
                log::warn!("Ignoring tagger settings that are not a table: {}", other);
                return defaults.clone();
            }
        };

        Self {
            need_image_tag: coerce_tag(table.get("need_image_tag"), &defaults.need_image_tag),
            keywords: coerce_keywords(table.get("keywords"), &defaults.keywords),
            min_keyword_hits: coerce_min_hits(
                table.get("min_keyword_hits"),
                defaults.min_keyword_hits,
            ),
            case_sensitive: coerce_bool(table, "case_sensitive", defaults.case_sensitive),
            use_regex: coerce_bool(table, "use_regex", defaults.use_regex),
            remove_tag_if_resolved: coerce_bool(
                table,
                "remove_tag_if_resolved",
                defaults.remove_tag_if_resolved,
            ),
        }
    }

    pub fn match_config(&self) -> Result<MatchConfig, AppError> {
        MatchConfig::prepare(
            &self.keywords,
            self.min_keyword_hits,
            self.case_sensitive,
            self.use_regex,
        )
    }

    pub fn keywords_text(&self) -> String {
        keywords_to_text(&self.keywords)
    }
}

fn load_packaged_table() -> Result<Value, ConfigError> {
    Config::builder()
        .add_source(File::from_str(PACKAGED_DEFAULTS, FileFormat::Toml))
        .build()?
        .get::<Value>("tagger")
}

/// Tag names go through the same cleanup wherever they are entered.
pub fn normalize_tag(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_NEED_IMAGE_TAG.to_string()
    } else {
        trimmed.to_string()
    }
}

fn coerce_tag(raw: Option<&Value>, default: &str) -> String {
    match raw {
        Some(Value::String(s)) => normalize_tag(s),
        Some(Value::Number(n)) => normalize_tag(&n.to_string()),
        Some(Value::Bool(b)) => normalize_tag(&b.to_string()),
        _ => normalize_tag(default),
    }
}

fn coerce_keywords(raw: Option<&Value>, default: &[String]) -> Vec<String> {
    match raw {
        None => default.to_vec(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                other => {
                    log::debug!("Dropping non-text keyword entry: {}", other);
                    None
                }
            })
            .collect(),
        Some(other) => {
            log::warn!("`keywords` is not a list ({}); treating it as empty", other);
            Vec::new()
        }
    }
}

fn coerce_min_hits(raw: Option<&Value>, default: u32) -> u32 {
    let parsed: Option<i64> = match raw {
        None => Some(default as i64),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Bool(b)) => Some(*b as i64),
        Some(_) => None,
    };
    let hits = parsed.unwrap_or_else(|| {
        log::warn!("`min_keyword_hits` is not a number; using 1");
        1
    });
    hits.clamp(1, u32::MAX as i64) as u32
}

fn coerce_bool(table: &Map<String, Value>, key: &str, default: bool) -> bool {
    match table.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" | "" => false,
            _ => {
                log::warn!("`{}` has unrecognised value {:?}; using {}", key, s, default);
                default
            }
        },
        Some(other) => {
            log::warn!("`{}` is not a boolean ({}); using {}", key, other, default);
            default
        }
    }
}

/// Renders keywords for a one-per-line editor.
pub fn keywords_to_text<S: AsRef<str>>(keywords: &[S]) -> String {
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Characters that end a line in pasted editor text.
const LINE_BREAKS: [char; 10] = [
    '\n', '\r', '\x0b', '\x0c', '\x1c', '\x1d', '\x1e', '\u{85}', '\u{2028}', '\u{2029}',
];

/// Parses one-per-line editor text back into keywords.
pub fn text_to_keywords(text: &str) -> Vec<String> {
    text.split(LINE_BREAKS)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// What the settings editor shows and sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsForm {
    pub need_image_tag: String,
    pub remove_tag_if_resolved: bool,
    pub min_keyword_hits: u32,
    pub case_sensitive: bool,
    pub use_regex: bool,
    pub keywords_text: String,
}

impl From<&TaggerSettings> for SettingsForm {
    fn from(settings: &TaggerSettings) -> Self {
        Self {
            need_image_tag: settings.need_image_tag.clone(),
            remove_tag_if_resolved: settings.remove_tag_if_resolved,
            min_keyword_hits: settings.min_keyword_hits,
            case_sensitive: settings.case_sensitive,
            use_regex: settings.use_regex,
            keywords_text: settings.keywords_text(),
        }
    }
}

impl From<SettingsForm> for TaggerSettings {
    fn from(form: SettingsForm) -> Self {
        Self {
            need_image_tag: normalize_tag(&form.need_image_tag),
            keywords: text_to_keywords(&form.keywords_text),
            min_keyword_hits: form.min_keyword_hits.clamp(1, MAX_MIN_HITS),
            case_sensitive: form.case_sensitive,
            use_regex: form.use_regex,
            remove_tag_if_resolved: form.remove_tag_if_resolved,
        }
    }
}

pub fn overrides_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

/// Writes the editor's settings into the `tagger` table of the overrides
/// file, keeping any other keys that file already holds.
pub fn save_overrides(config_dir: &Path, settings: &TaggerSettings) -> Result<(), AppError> {
    let path = overrides_path(config_dir);
    let mut document = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => map,
            _ => {
                log::warn!("Replacing unreadable settings overrides at {:?}", path);
                Map::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(e.into()),
    };
    document.insert("tagger".to_string(), serde_json::to_value(settings)?);

    std::fs::create_dir_all(config_dir)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(document))?)?;
    std::fs::rename(&tmp, &path)?;
    log::info!("Settings saved to {:?}", path);
    Ok(())
}
