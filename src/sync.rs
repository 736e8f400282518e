//! Tag synchronization: selection → assessment → reconciliation.
//!
//! The three stages run on blocking threads connected by channels. The
//! selection stage only talks to the store, the processor judges notes in
//! parallel, and a single tagger thread performs every write, so writes to
//! the collection happen one note at a time.

use crate::error::AppError;
use crate::matcher::MatchConfig;
use crate::processor;
use crate::settings::TaggerSettings;
use crate::store::NoteStore;
use crate::tagger::{self, TagPolicy};
use crate::walker;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PROGRESS_LABEL: &str = "NeedImage: scanning notes…";

pub const NO_KEYWORDS_NOTICE: &str =
    "`keywords` in the configuration is empty.\nNeedImage processing will not run.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub scanned: usize,
    pub added: usize,
    pub removed: usize,
}

impl RunResult {
    pub fn summary(&self, policy: &TagPolicy) -> String {
        let mut lines = vec![
            format!("Notes scanned: {}", self.scanned),
            format!("Newly added '{}' tags: {}", policy.tag, self.added),
        ];
        if policy.remove_if_resolved {
            lines.push(format!(
                "Removed '{}' tags (image found): {}",
                policy.tag, self.removed
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoKeywords,
}

/// A skipped scan never touched the collection, which is not the same as
/// a scan that found nothing to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    Completed(RunResult),
}

impl SyncOutcome {
    pub fn summary(&self, policy: &TagPolicy) -> String {
        match self {
            SyncOutcome::Skipped {
                reason: SkipReason::NoKeywords,
            } => NO_KEYWORDS_NOTICE.to_string(),
            SyncOutcome::Completed(result) => result.summary(policy),
        }
    }

    pub fn result(&self) -> Option<&RunResult> {
        match self {
            SyncOutcome::Completed(result) => Some(result),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
}

#[derive(Debug, Default)]
pub struct ScanProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
    log_every: usize,
}

impl ScanProgress {
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every,
            ..Self::default()
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn advance(&self) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.log_every > 0 && processed % self.log_every == 0 {
            log::info!(
                "{} {}/{}",
                PROGRESS_LABEL,
                processed,
                self.total.load(Ordering::SeqCst)
            );
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
        }
    }
}

/// Everything one run needs, fixed before the first note is read.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub query: String,
    pub policy: TagPolicy,
    pub matcher: MatchConfig,
    pub num_workers: usize,
}

impl SyncPlan {
    pub fn new(query: &str, settings: &TaggerSettings, num_workers: usize) -> Result<Self, AppError> {
        Ok(Self {
            query: query.trim().to_string(),
            policy: TagPolicy {
                tag: settings.need_image_tag.clone(),
                remove_if_resolved: settings.remove_tag_if_resolved,
            },
            matcher: settings.match_config()?,
            num_workers,
        })
    }
}

pub async fn synchronize(
    store: Arc<dyn NoteStore>,
    plan: SyncPlan,
    progress: Arc<ScanProgress>,
) -> Result<SyncOutcome, AppError> {
    if plan.matcher.is_empty() {
        log::info!("No keywords configured; skipping scan");
        return Ok(SyncOutcome::Skipped {
            reason: SkipReason::NoKeywords,
        });
    }

    let (ids_tx, ids_rx) = crossbeam_channel::unbounded();
    let (assessments_tx, assessments_rx) = crossbeam_channel::unbounded();

    let store_for_walker = store.clone();
    let store_for_processor = store.clone();
    let progress_for_walker = progress.clone();
    let query = plan.query;
    let matcher = plan.matcher;
    let num_workers = plan.num_workers;
    let policy = plan.policy;

    let walker_handle = tokio::task::spawn_blocking(move || {
        walker::start_selecting(store_for_walker, &query, &progress_for_walker, ids_tx)
    });

    let processor_handle = tokio::task::spawn_blocking(move || {
        processor::start_processing(store_for_processor, matcher, num_workers, ids_rx, assessments_tx)
    });

    let tagger_handle = tokio::task::spawn_blocking(move || {
        tagger::start_tagging(store, policy, &progress, assessments_rx)
    });

    let (walked, processed, tagged) =
        tokio::try_join!(walker_handle, processor_handle, tagger_handle)?;

    let result = first_failure(walked, processed, tagged)?;
    Ok(SyncOutcome::Completed(result))
}

/// When one stage fails the others usually fail too, with a closed
/// channel. Report the stage that failed for a reason of its own.
fn first_failure(
    walked: Result<usize, AppError>,
    processed: Result<(), AppError>,
    tagged: Result<RunResult, AppError>,
) -> Result<RunResult, AppError> {
    let mut errors: Vec<AppError> = Vec::new();
    let result = match tagged {
        Ok(result) => Some(result),
        Err(e) => {
            errors.push(e);
            None
        }
    };
    if let Err(e) = processed {
        errors.push(e);
    }
    if let Err(e) = walked {
        errors.push(e);
    }

    if let Some(pos) = errors
        .iter()
        .position(|e| !matches!(e, AppError::SendError | AppError::RecvError))
    {
        let e = errors.swap_remove(pos);
        log::error!("Scan failed: {}", e);
        return Err(e);
    }
    if let Some(e) = errors.into_iter().next() {
        log::error!("Scan failed: {}", e);
        return Err(e);
    }
    result.ok_or_else(|| AppError::Generic("tagger finished without a result".to_string()))
}
