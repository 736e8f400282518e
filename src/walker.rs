use crate::error::AppError;
use crate::note::NoteId;
use crate::store::NoteStore;
use crate::sync::ScanProgress;
use std::sync::Arc;

/// Resolves the selection and feeds every note id to the processor. A blank
/// query selects the whole collection. Ids are forwarded as the store
/// returns them, repeats included.
pub fn start_selecting(
    store: Arc<dyn NoteStore>,
    query: &str,
    progress: &ScanProgress,
    ids_tx: crossbeam_channel::Sender<NoteId>,
) -> Result<usize, AppError> {
    let ids = if query.trim().is_empty() {
        log::info!("Selecting all notes in the collection");
        futures::executor::block_on(store.all_note_ids())?
    } else {
        log::info!("Selecting notes matching: {}", query);
        futures::executor::block_on(store.find_notes(query))?
    };

    let total = ids.len();
    progress.set_total(total);
    log::info!("Selection resolved to {} notes", total);

    for id in ids {
        log::trace!("Sending note {} to processor", id);
        ids_tx.send(id)?;
    }

    log::debug!("Selection complete.");
    Ok(total)
}
