use crate::config::AppConfig;
use crate::error::AppError;
use crate::note::{Note, NoteId};
use crate::query::Query;
use crate::store::NoteStore;
use crate::stores::poisoned;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    #[serde(default)]
    notes: Vec<Note>,
}

/// Above this many notes, opening a collection file logs a hint to switch
/// to the `directory` engine.
pub const LARGE_COLLECTION: usize = 5_000;

/// A whole collection kept in memory and, when backed by a path, written
/// back to a single JSON file after every update.
///
/// Each `update_note` re-serializes and rewrites the entire file, so a full
/// scan that touches `k` of `n` notes writes `k * n` notes' worth of bytes.
/// Large collections belong in the `directory` engine, which writes one
/// file per changed note.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    notes: RwLock<BTreeMap<NoteId, Note>>,
}

impl JsonFileStore {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Self::open(&config.collection_path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        log::debug!("Loading note collection from {:?}", path);

        let collection: CollectionFile = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Collection file {:?} not found. Starting empty.", path);
                CollectionFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let notes = index_notes(collection.notes);
        log::info!("Loaded {} notes from {:?}", notes.len(), path);
        if notes.len() > LARGE_COLLECTION {
            log::warn!(
                "{:?} holds {} notes and is rewritten on every update. Consider engine = \"directory\".",
                path,
                notes.len()
            );
        }
        Ok(Self {
            path: Some(path.to_path_buf()),
            notes: RwLock::new(notes),
        })
    }

    pub fn in_memory(notes: impl IntoIterator<Item = Note>) -> Self {
        Self {
            path: None,
            notes: RwLock::new(index_notes(notes)),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<Note>, AppError> {
        Ok(self.notes.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn persist(&self, notes: &BTreeMap<NoteId, Note>) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let collection = CollectionFile {
            notes: notes.values().cloned().collect(),
        };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&collection)?)?;
        std::fs::rename(&tmp, path)?;
        log::trace!("Collection written to {:?}", path);
        Ok(())
    }
}

fn index_notes(notes: impl IntoIterator<Item = Note>) -> BTreeMap<NoteId, Note> {
    let mut indexed = BTreeMap::new();
    for note in notes {
        if let Some(previous) = indexed.insert(note.id, note) {
            log::warn!("Duplicate note id {} in collection; keeping the later copy", previous.id);
        }
    }
    indexed
}

#[async_trait]
impl NoteStore for JsonFileStore {
    async fn all_note_ids(&self) -> Result<Vec<NoteId>, AppError> {
        Ok(self.notes.read().map_err(poisoned)?.keys().copied().collect())
    }

    async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, AppError> {
        let query = Query::parse(query)?;
        let notes = self.notes.read().map_err(poisoned)?;
        Ok(notes
            .values()
            .filter(|note| query.matches(note))
            .map(|note| note.id)
            .collect())
    }

    async fn get_note(&self, id: NoteId) -> Result<Note, AppError> {
        self.notes
            .read()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("note {}", id)))
    }

    async fn update_note(&self, note: &Note) -> Result<(), AppError> {
        let mut notes = self.notes.write().map_err(poisoned)?;
        let previous = match notes.get_mut(&note.id) {
            Some(existing) => std::mem::replace(existing, note.clone()),
            None => return Err(AppError::NotFound(format!("note {}", note.id))),
        };

        if let Err(e) = self.persist(&notes) {
            notes.insert(note.id, previous);
            return Err(e);
        }
        log::debug!("Updated note {}", note.id);
        Ok(())
    }

    async fn count_notes(&self) -> Result<u64, AppError> {
        Ok(self.notes.read().map_err(poisoned)?.len() as u64)
    }
}
