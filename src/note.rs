// src/note.rs

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named field. Anything that is not a JSON string is read as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteField {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: Option<String>,
}

impl NoteField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    #[serde(default)]
    pub note_type: String,
    #[serde(default)]
    pub deck: String,
    #[serde(default)]
    pub fields: Vec<NoteField>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Note {
    pub fn new(id: i64) -> Self {
        Self {
            id: NoteId(id),
            note_type: String::new(),
            deck: String::new(),
            fields: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.push(NoteField::new(name, value));
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn with_deck(mut self, deck: &str) -> Self {
        self.deck = deck.to_string();
        self
    }

    /// Field texts in the note's own field order.
    pub fn field_texts(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(NoteField::text)
    }

    /// Field lookup by name, ignoring case.
    pub fn field(&self, name: &str) -> Option<&NoteField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns true when the tag was not present before.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_string())
    }

    /// Returns true when the tag was present before.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}
