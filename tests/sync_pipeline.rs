use async_trait::async_trait;
use need_image_tagger::error::AppError;
use need_image_tagger::note::{Note, NoteId};
use need_image_tagger::settings::TaggerSettings;
use need_image_tagger::store::NoteStore;
use need_image_tagger::stores::directory::DirectoryStore;
use need_image_tagger::stores::json_file::JsonFileStore;
use need_image_tagger::sync::{synchronize, RunResult, ScanProgress, SkipReason, SyncOutcome, SyncPlan};
use std::sync::Arc;

fn settings(keywords: &[&str]) -> TaggerSettings {
    TaggerSettings {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        ..TaggerSettings::default()
    }
}

async fn run(store: Arc<dyn NoteStore>, query: &str, settings: &TaggerSettings) -> SyncOutcome {
    let plan = SyncPlan::new(query, settings, 2).unwrap();
    synchronize(store, plan, Arc::new(ScanProgress::new(0)))
        .await
        .unwrap()
}

fn completed(outcome: SyncOutcome) -> RunResult {
    match outcome {
        SyncOutcome::Completed(result) => result,
        other => panic!("expected a completed scan, got {:?}", other),
    }
}

fn collection() -> Vec<Note> {
    vec![
        Note::new(1)
            .with_deck("Cardiology")
            .with_field("Front", "Typical echo findings in tamponade?")
            .with_field("Back", "RV diastolic collapse"),
        Note::new(2)
            .with_deck("Cardiology")
            .with_field("Front", "ECG in hyperkalaemia")
            .with_field("Back", "<img src=\"peaked-t.png\">"),
        Note::new(3)
            .with_deck("Renal")
            .with_field("Front", "Contact with nephrotoxins")
            .with_field("Back", "Stop them"),
        Note::new(4)
            .with_deck("Renal")
            .with_field("Front", "Renal ultrasound in obstruction")
            .with_tag("NeedImage"),
        Note::new(5)
            .with_deck("Renal")
            .with_field("Front", "Fluid management")
            .with_tag("NeedImage"),
    ]
}

#[tokio::test]
async fn tags_notes_that_mention_imaging_without_a_picture() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let result = completed(run(store.clone(), "", &TaggerSettings::default()).await);

    assert_eq!(
        result,
        RunResult {
            scanned: 5,
            added: 1,
            removed: 1
        }
    );
    assert!(store.get_note(NoteId(1)).await.unwrap().has_tag("NeedImage"));
    assert!(!store.get_note(NoteId(2)).await.unwrap().has_tag("NeedImage"));
    assert!(!store.get_note(NoteId(3)).await.unwrap().has_tag("NeedImage"));
    assert!(store.get_note(NoteId(4)).await.unwrap().has_tag("NeedImage"));
    assert!(!store.get_note(NoteId(5)).await.unwrap().has_tag("NeedImage"));
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let first = completed(run(store.clone(), "", &TaggerSettings::default()).await);
    assert!(first.added + first.removed > 0);

    let snapshot = store.snapshot().unwrap();
    let second = completed(run(store.clone(), "", &TaggerSettings::default()).await);
    assert_eq!(
        second,
        RunResult {
            scanned: 5,
            added: 0,
            removed: 0
        }
    );
    assert_eq!(store.snapshot().unwrap(), snapshot);
}

#[tokio::test]
async fn adding_a_picture_resolves_the_tag() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    completed(run(store.clone(), "", &TaggerSettings::default()).await);

    let mut note = store.get_note(NoteId(1)).await.unwrap();
    note.fields[1].value = Some("<img src=\"collapse.gif\"> RV diastolic collapse".to_string());
    store.update_note(&note).await.unwrap();

    let result = completed(run(store.clone(), "", &TaggerSettings::default()).await);
    assert_eq!(result.removed, 1);
    assert_eq!(result.added, 0);
    assert!(!store.get_note(NoteId(1)).await.unwrap().has_tag("NeedImage"));
}

#[tokio::test]
async fn keeps_resolved_tags_when_removal_is_disabled() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let settings = TaggerSettings {
        remove_tag_if_resolved: false,
        ..TaggerSettings::default()
    };

    let result = completed(run(store.clone(), "", &settings).await);
    assert_eq!(result.removed, 0);
    assert!(store.get_note(NoteId(5)).await.unwrap().has_tag("NeedImage"));
}

#[tokio::test]
async fn query_limits_the_scan() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let result = completed(run(store.clone(), "deck:Cardiology", &TaggerSettings::default()).await);

    assert_eq!(result.scanned, 2);
    assert_eq!(result.added, 1);
    assert_eq!(result.removed, 0);
    // Outside the selection, untouched.
    assert!(store.get_note(NoteId(5)).await.unwrap().has_tag("NeedImage"));
}

#[tokio::test]
async fn no_keywords_skips_without_touching_notes() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let before = store.snapshot().unwrap();

    let outcome = run(store.clone(), "", &settings(&["", "   "])).await;
    assert_eq!(
        outcome,
        SyncOutcome::Skipped {
            reason: SkipReason::NoKeywords
        }
    );
    assert_eq!(store.snapshot().unwrap(), before);
}

#[tokio::test]
async fn empty_selection_is_a_completed_scan() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let outcome = run(store, "deck:Neurology", &TaggerSettings::default()).await;
    assert_eq!(outcome, SyncOutcome::Completed(RunResult::default()));
}

#[tokio::test]
async fn custom_tag_and_threshold() {
    let store = Arc::new(JsonFileStore::in_memory(vec![
        Note::new(1).with_field("Front", "needs mri"),
        Note::new(2).with_field("Front", "needs mri and echo"),
    ]));
    let settings = TaggerSettings {
        need_image_tag: "Imaging::Todo".to_string(),
        min_keyword_hits: 2,
        ..settings(&["mri", "echo"])
    };

    let result = completed(run(store.clone(), "", &settings).await);
    assert_eq!(result.added, 1);
    assert!(!store.get_note(NoteId(1)).await.unwrap().has_tag("Imaging::Todo"));
    assert!(store.get_note(NoteId(2)).await.unwrap().has_tag("Imaging::Todo"));
}

#[tokio::test]
async fn works_against_a_note_directory() {
    let dir = tempfile::tempdir().unwrap();
    for note in collection() {
        std::fs::write(
            DirectoryStore::note_path(dir.path(), note.id),
            serde_json::to_string(&note).unwrap(),
        )
        .unwrap();
    }
    let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());

    let first = completed(run(store.clone(), "", &TaggerSettings::default()).await);
    assert_eq!((first.scanned, first.added, first.removed), (5, 1, 1));

    let second = completed(run(store.clone(), "", &TaggerSettings::default()).await);
    assert_eq!((second.added, second.removed), (0, 0));
}

/// Hands back every id twice, as a host search might.
struct RepeatingStore {
    inner: JsonFileStore,
}

#[async_trait]
impl NoteStore for RepeatingStore {
    async fn all_note_ids(&self) -> Result<Vec<NoteId>, AppError> {
        let ids = self.inner.all_note_ids().await?;
        Ok(ids.iter().chain(ids.iter()).copied().collect())
    }
    async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, AppError> {
        self.inner.find_notes(query).await
    }
    async fn get_note(&self, id: NoteId) -> Result<Note, AppError> {
        self.inner.get_note(id).await
    }
    async fn update_note(&self, note: &Note) -> Result<(), AppError> {
        self.inner.update_note(note).await
    }
    async fn count_notes(&self) -> Result<u64, AppError> {
        self.inner.count_notes().await
    }
}

#[tokio::test]
async fn repeated_ids_are_counted_but_reconciled_once() {
    let store = Arc::new(RepeatingStore {
        inner: JsonFileStore::in_memory(collection()),
    });
    let result = completed(run(store, "", &TaggerSettings::default()).await);
    assert_eq!(
        result,
        RunResult {
            scanned: 10,
            added: 1,
            removed: 1
        }
    );
}

/// Fails to load one particular note.
struct BrokenStore {
    inner: JsonFileStore,
    broken: NoteId,
}

#[async_trait]
impl NoteStore for BrokenStore {
    async fn all_note_ids(&self) -> Result<Vec<NoteId>, AppError> {
        self.inner.all_note_ids().await
    }
    async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>, AppError> {
        self.inner.find_notes(query).await
    }
    async fn get_note(&self, id: NoteId) -> Result<Note, AppError> {
        if id == self.broken {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk went away",
            )));
        }
        self.inner.get_note(id).await
    }
    async fn update_note(&self, note: &Note) -> Result<(), AppError> {
        self.inner.update_note(note).await
    }
    async fn count_notes(&self) -> Result<u64, AppError> {
        self.inner.count_notes().await
    }
}

#[tokio::test]
async fn load_failures_are_reported_not_swallowed() {
    let store = Arc::new(BrokenStore {
        inner: JsonFileStore::in_memory(collection()),
        broken: NoteId(3),
    });
    let plan = SyncPlan::new("", &TaggerSettings::default(), 2).unwrap();
    let err = synchronize(store, plan, Arc::new(ScanProgress::new(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Io(_)), "unexpected error: {}", err);
}

#[tokio::test]
async fn bad_query_is_reported() {
    let store = Arc::new(JsonFileStore::in_memory(collection()));
    let plan = SyncPlan::new("deck:\"open", &TaggerSettings::default(), 2).unwrap();
    let err = synchronize(store, plan, Arc::new(ScanProgress::new(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Query(_)));
}
