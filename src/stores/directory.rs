use crate::config::AppConfig;
use crate::error::AppError;
use crate::note::{Note, NoteId};
use crate::query::Query;
use crate::store::NoteStore;
use crate::stores::poisoned;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// One `<id>.json` file per note under a single directory.
pub struct DirectoryStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DirectoryStore {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Self::open(&config.collection_path)
    }

    pub fn open(root: impl AsRef<Path>) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            log::info!("Created note directory: {:?}", root);
        }
        log::debug!("Directory note store initialized at {:?}", root);
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn note_path(root: &Path, id: NoteId) -> PathBuf {
        root.join(format!("{}.json", id))
    }
}

fn list_ids(root: &Path) -> Result<Vec<NoteId>, AppError> {
    let mut ids = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", path);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            log::trace!("Skipping file with unsupported extension: {:?}", path);
            continue;
        }
        match path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok())
        {
            Some(id) => ids.push(NoteId(id)),
            None => log::debug!("Skipping file without a note id name: {:?}", path),
        }
    }
    ids.sort();
    Ok(ids)
}

fn read_note(root: &Path, id: NoteId) -> Result<Note, AppError> {
    let path = DirectoryStore::note_path(root, id);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("note {}", id)))
        }
        Err(e) => return Err(e.into()),
    };
    let mut note: Note = serde_json::from_str(&contents)?;
    if note.id != id {
        log::warn!("Note file {:?} carries id {}; using {}", path, note.id, id);
        note.id = id;
    }
    Ok(note)
}

fn write_note(root: &Path, note: &Note) -> Result<(), AppError> {
    let path = DirectoryStore::note_path(root, note.id);
    if !path.is_file() {
        return Err(AppError::NotFound(format!("note {}", note.id)));
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(note)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

#[async_trait]
impl NoteStore for DirectoryStore {
    async fn all_note_ids(&self) -> Result<Vec<NoteId>, AppError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_ids(&root)).await?
    }

    async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, AppError> {
        let query = Query::parse(query)?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            log::debug!("Searching note directory {:?}", root);
            let mut found = Vec::new();
            for id in list_ids(&root)? {
                if query.matches(&read_note(&root, id)?) {
                    found.push(id);
                }
            }
            Ok(found)
        })
        .await?
    }

    async fn get_note(&self, id: NoteId) -> Result<Note, AppError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || read_note(&root, id)).await?
    }

    async fn update_note(&self, note: &Note) -> Result<(), AppError> {
        let root = self.root.clone();
        let write_lock = self.write_lock.clone();
        let note = note.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = write_lock.lock().map_err(poisoned)?;
            write_note(&root, &note)?;
            log::debug!("Updated note {}", note.id);
            Ok(())
        })
        .await?
    }

    async fn count_notes(&self) -> Result<u64, AppError> {
        Ok(self.all_note_ids().await?.len() as u64)
    }
}
