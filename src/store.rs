use crate::error::AppError;
use crate::note::{Note, NoteId};
use async_trait::async_trait;

/// The note collection the tagger works against.
///
/// Implementations serialize their own writes; `update_note` replaces a
/// single note atomically.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn all_note_ids(&self) -> Result<Vec<NoteId>, AppError>;
    async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, AppError>;
    async fn get_note(&self, id: NoteId) -> Result<Note, AppError>;
    async fn update_note(&self, note: &Note) -> Result<(), AppError>;
    async fn count_notes(&self) -> Result<u64, AppError>;
}
