pub mod directory;
pub mod json_file;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::NoteStore;
use directory::DirectoryStore;
use json_file::JsonFileStore;
use std::sync::Arc;

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn NoteStore>, AppError> {
    log::debug!("Opening '{}' note store at {}", config.engine, config.collection_path);
    match config.engine.as_str() {
        "directory" => Ok(Arc::new(DirectoryStore::new(config)?)),
        "file" => Ok(Arc::new(JsonFileStore::new(config)?)),
        other => Err(AppError::Generic(format!("unknown note store engine: {}", other))),
    }
}

pub(crate) fn poisoned<T>(_: T) -> AppError {
    AppError::Generic("note store lock poisoned".to_string())
}
