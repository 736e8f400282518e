use crate::error::AppError;
use crate::matcher::MatchConfig;
use crate::note::{Note, NoteId};
use crate::store::NoteStore;
use rayon::prelude::*;
use std::sync::Arc;

/// Notes are loaded in batches of this size and judged in parallel.
const BATCH_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct Assessment {
    pub note: Note,
    pub needs_image: bool,
}

pub fn start_processing(
    store: Arc<dyn NoteStore>,
    matcher: MatchConfig,
    num_workers: usize,
    ids_rx: crossbeam_channel::Receiver<NoteId>,
    assessments_tx: crossbeam_channel::Sender<Assessment>,
) -> Result<(), AppError> {
    log::info!("Starting note assessment with {} workers", num_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers.max(1))
        .build()?;

    let mut batch = Vec::with_capacity(BATCH_SIZE);
    for id in ids_rx {
        // A note that cannot be loaded aborts the run rather than being
        // skipped; notes already reconciled stay reconciled.
        let note = futures::executor::block_on(store.get_note(id))?;
        batch.push(note);
        if batch.len() == BATCH_SIZE {
            assess_batch(&pool, &matcher, std::mem::take(&mut batch), &assessments_tx)?;
        }
    }
    if !batch.is_empty() {
        assess_batch(&pool, &matcher, batch, &assessments_tx)?;
    }

    log::info!("All notes assessed.");
    Ok(())
}

fn assess_batch(
    pool: &rayon::ThreadPool,
    matcher: &MatchConfig,
    batch: Vec<Note>,
    assessments_tx: &crossbeam_channel::Sender<Assessment>,
) -> Result<(), AppError> {
    log::trace!("Assessing batch of {} notes", batch.len());
    let assessed: Vec<Assessment> = pool.install(|| {
        batch
            .into_par_iter()
            .map(|note| {
                let needs_image = matcher.needs_image(&note);
                log::trace!("Note {} needs image: {}", note.id, needs_image);
                Assessment { note, needs_image }
            })
            .collect()
    });

    for assessment in assessed {
        assessments_tx.send(assessment)?;
    }
    Ok(())
}
