//! Keyword matching: decides whether a note still needs a picture.
//!
//! Keywords are prepared once per batch into a [`MatchConfig`]; every note of
//! the batch is then judged against the same immutable configuration.

use crate::error::AppError;
use crate::note::Note;
use regex::Regex;
use std::borrow::Cow;

/// A field carrying this marker already has a picture.
pub const IMAGE_MARKER: &str = "<img";

#[derive(Debug, Clone)]
struct Keyword {
    text: String,
    whole_word: Option<Regex>,
}

impl Keyword {
    fn found_in(&self, text: &str) -> bool {
        match &self.whole_word {
            Some(pattern) => pattern.is_match(text),
            None => text.contains(self.text.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    keywords: Vec<Keyword>,
    min_hits: usize,
    case_sensitive: bool,
    use_regex: bool,
}

impl MatchConfig {
    /// Trims the configured keywords, drops blank ones and lowercases the rest
    /// unless matching is case sensitive. Order and duplicates are kept.
    ///
    /// In whole-word mode each keyword is escaped and compiled into a
    /// `\b...\b` pattern here, so nothing is compiled per note.
    pub fn prepare<I, S>(
        raw_keywords: I,
        min_hits: u32,
        case_sensitive: bool,
        use_regex: bool,
    ) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords = Vec::new();
        for raw in raw_keywords {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let text = if case_sensitive {
                trimmed.to_string()
            } else {
                trimmed.to_lowercase()
            };
            let whole_word = if use_regex {
                Some(Regex::new(&format!(r"\b{}\b", regex::escape(&text)))?)
            } else {
                None
            };
            keywords.push(Keyword { text, whole_word });
        }

        log::debug!(
            "Prepared {} keywords (min_hits={}, case_sensitive={}, whole_word={})",
            keywords.len(),
            min_hits,
            case_sensitive,
            use_regex
        );

        Ok(Self {
            keywords,
            min_hits: min_hits.max(1) as usize,
            case_sensitive,
            use_regex,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.text.as_str())
    }

    pub fn min_hits(&self) -> usize {
        self.min_hits
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn use_regex(&self) -> bool {
        self.use_regex
    }

    pub fn needs_image(&self, note: &Note) -> bool {
        self.evaluate_fields(note.field_texts())
    }

    /// Single pass over the fields. The image marker vetoes the whole note
    /// from any field; hit counting stops at `min_hits` but the remaining
    /// fields are still checked for the marker.
    pub fn evaluate_fields<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.keywords.is_empty() {
            return false;
        }

        let mut hits = 0usize;
        for raw in fields {
            if raw.is_empty() {
                continue;
            }
            if raw.contains(IMAGE_MARKER) {
                return false;
            }
            if hits >= self.min_hits {
                continue;
            }

            let text: Cow<'_, str> = if self.case_sensitive {
                Cow::Borrowed(raw)
            } else {
                Cow::Owned(raw.to_lowercase())
            };

            for keyword in &self.keywords {
                if keyword.found_in(&text) {
                    hits += 1;
                    log::trace!("Keyword '{}' hit ({} so far)", keyword.text, hits);
                    if hits >= self.min_hits {
                        break;
                    }
                }
            }
        }

        hits >= self.min_hits
    }
}
