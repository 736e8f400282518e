use crate::error::AppError;
use crate::note::{Note, NoteId};
use crate::processor::Assessment;
use crate::store::NoteStore;
use crate::sync::{RunResult, ScanProgress};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPolicy {
    pub tag: String,
    pub remove_if_resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Added,
    Removed,
    Unchanged,
}

/// Brings one note's tag in line with its verdict. Only the in-memory note
/// is touched; persisting is up to the caller.
pub fn reconcile(note: &mut Note, needs_image: bool, policy: &TagPolicy) -> TagChange {
    if needs_image {
        if note.add_tag(&policy.tag) {
            return TagChange::Added;
        }
    } else if policy.remove_if_resolved && note.remove_tag(&policy.tag) {
        return TagChange::Removed;
    }
    TagChange::Unchanged
}

pub fn start_tagging(
    store: Arc<dyn NoteStore>,
    policy: TagPolicy,
    progress: &ScanProgress,
    assessments_rx: crossbeam_channel::Receiver<Assessment>,
) -> Result<RunResult, AppError> {
    log::info!("Starting tag reconciliation for '{}'", policy.tag);

    let mut result = RunResult::default();
    let mut seen: HashSet<NoteId> = HashSet::new();

    for Assessment { mut note, needs_image } in assessments_rx {
        result.scanned += 1;
        progress.advance();

        // A repeated id was already reconciled from an identical verdict.
        if !seen.insert(note.id) {
            log::debug!("Note {} selected more than once; already reconciled", note.id);
            continue;
        }

        match reconcile(&mut note, needs_image, &policy) {
            TagChange::Added => {
                futures::executor::block_on(store.update_note(&note))?;
                result.added += 1;
                log::debug!("Tagged note {} with '{}'", note.id, policy.tag);
            }
            TagChange::Removed => {
                futures::executor::block_on(store.update_note(&note))?;
                result.removed += 1;
                log::debug!("Removed '{}' from note {}", policy.tag, note.id);
            }
            TagChange::Unchanged => {
                log::trace!("Note {} unchanged", note.id);
            }
        }
    }

    log::info!(
        "Tag reconciliation complete: {} scanned, {} added, {} removed",
        result.scanned,
        result.added,
        result.removed
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(remove_if_resolved: bool) -> TagPolicy {
        TagPolicy {
            tag: "NeedImage".to_string(),
            remove_if_resolved,
        }
    }

    #[test]
    fn untagged_note_that_needs_image_gets_tag() {
        let mut note = Note::new(1);
        assert_eq!(reconcile(&mut note, true, &policy(true)), TagChange::Added);
        assert!(note.has_tag("NeedImage"));
    }

    #[test]
    fn tagged_note_that_needs_image_is_left_alone() {
        let mut note = Note::new(1).with_tag("NeedImage");
        assert_eq!(reconcile(&mut note, true, &policy(true)), TagChange::Unchanged);
        assert!(note.has_tag("NeedImage"));
    }

    #[test]
    fn resolved_note_loses_tag_when_removal_enabled() {
        let mut note = Note::new(1).with_tag("NeedImage").with_tag("cardio");
        assert_eq!(reconcile(&mut note, false, &policy(true)), TagChange::Removed);
        assert!(!note.has_tag("NeedImage"));
        assert!(note.has_tag("cardio"));
    }

    #[test]
    fn resolved_note_keeps_tag_when_removal_disabled() {
        let mut note = Note::new(1).with_tag("NeedImage");
        assert_eq!(reconcile(&mut note, false, &policy(false)), TagChange::Unchanged);
        assert!(note.has_tag("NeedImage"));
    }

    #[test]
    fn untagged_resolved_note_is_left_alone() {
        let mut note = Note::new(1);
        assert_eq!(reconcile(&mut note, false, &policy(true)), TagChange::Unchanged);
        assert!(note.tags.is_empty());
    }
}
