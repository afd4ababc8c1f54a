//! End-to-end indexing and search against a real SQLite store
//!
//! These tests drive the engine and the matcher with a scripted provider:
//! - Indexing photos with and without faces
//! - Incremental reruns and modification-time changes
//! - Per-file error accounting for provider and database failures
//! - Searching, including the reference image edge cases

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use face_finder_embed::{
    CommandProvider, DetectionModel, EMBEDDING_DIMENSION, EmbedConfig, FaceDetection,
    FaceEmbedding, FaceEmbeddingProvider, StaticProvider,
};
use face_finder_index::ConfigError;
use face_finder_index::config::{IndexingConfig, SearchConfig};
use face_finder_index::retrieval::{indexing_engine::IndexingEngine, matcher::FaceMatcher};
use face_finder_index::status::{StatusEvent, status_channel};
use face_finder_index::storage::{
    FaceRecord, FaceStore, IndexedFile, IndexedSnapshot, ProcessedFile, StoreStats, StoredFace,
    sqlite_store::SqliteFaceStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::{TempDir, tempdir};

/// An embedding whose first component is `x` and all others 0
fn face(x: f64) -> FaceEmbedding {
    let mut values = vec![0.0; EMBEDDING_DIMENSION];
    values[0] = x;
    FaceEmbedding::new(values).unwrap()
}

struct Library {
    _dir: TempDir,
    photos: PathBuf,
    db: PathBuf,
}

impl Library {
    fn new(files: &[&str]) -> Result<Self> {
        let dir = tempdir()?;
        let root = dir.path().canonicalize()?;
        let photos = root.join("photos");
        fs::create_dir(&photos)?;
        for name in files {
            fs::write(photos.join(name), b"not really a jpeg")?;
        }
        Ok(Self {
            db: root.join("faces.db"),
            photos,
            _dir: dir,
        })
    }

    fn photo(&self, name: &str) -> PathBuf {
        self.photos.join(name)
    }

    fn indexing(&self) -> IndexingConfig {
        IndexingConfig::new(&self.db, vec![self.photos.clone()]).with_max_workers(2)
    }

    fn reference(&self, name: &str) -> Result<PathBuf> {
        let path = self.photos.parent().unwrap().join(name);
        fs::write(&path, b"reference")?;
        Ok(path)
    }
}

fn terminal_count(events: &[StatusEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

/// Every stored face as (path, raw encoding), in store order
async fn stored_faces(db: &Path) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let store = SqliteFaceStore::open_existing(db).await?;
    let faces = store
        .load_embeddings()
        .await?
        .into_iter()
        .map(|face| (face.file_path, face.encoding))
        .collect();
    store.close().await;
    Ok(faces)
}

async fn store_stats(db: &Path) -> Result<StoreStats> {
    let store = SqliteFaceStore::open_existing(db).await?;
    let stats = store.stats().await?;
    store.close().await;
    Ok(stats)
}

#[tokio::test]
async fn test_index_then_search_finds_photo() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg"])?;
    let reference = library.reference("me.jpg")?;
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("a.jpg", vec![face(0.0)])
            .with_embeddings("me.jpg", vec![face(0.0)]),
    );

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.faces_stored, 1);
    assert_eq!(rx.drain().last(), Some(&StatusEvent::Completed));

    let store = SqliteFaceStore::open_existing(&library.db).await?;
    let records = store.face_records(&library.photo("a.jpg")).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].embedding, face(0.0));
    assert!(store.face_records(&library.photo("b.jpg")).await?.is_empty());

    let (tx, rx) = status_channel();
    let search = SearchConfig::new(&library.db, &reference).with_tolerance(0.6);
    let outcome = FaceMatcher::new(search, provider.clone(), tx).run().await?;
    assert_eq!(outcome.matches, vec![library.photo("a.jpg")]);
    assert_eq!(outcome.faces_compared, 1);

    let events = rx.drain();
    assert!(events.contains(&StatusEvent::Match {
        path: library.photo("a.jpg")
    }));
    assert_eq!(events.last(), Some(&StatusEvent::Completed));
    assert_eq!(terminal_count(&events), 1);

    // Identical embeddings match even with zero tolerance
    let (tx, _rx) = status_channel();
    let exact = SearchConfig::new(&library.db, &reference).with_tolerance(0.0);
    let outcome = FaceMatcher::new(exact, provider, tx)
        .search_with_store(&store)
        .await?;
    assert_eq!(outcome.matches, vec![library.photo("a.jpg")]);
    store.close().await;
    Ok(())
}

#[tokio::test]
async fn test_second_run_skips_unchanged_files() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg"])?;
    let provider = Arc::new(StaticProvider::new().with_embeddings("a.jpg", vec![face(0.1)]));

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    let calls_after_first = provider.calls().len();
    assert_eq!(calls_after_first, 2);
    let faces_before = stored_faces(&library.db).await?;
    let stats_before = store_stats(&library.db).await?;
    assert_eq!(faces_before.len(), 1);

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.files_to_process, 0);
    assert_eq!(summary.files_skipped, 2);
    assert_eq!(summary.files_processed, 0);
    assert_eq!(provider.calls().len(), calls_after_first);
    assert_eq!(stored_faces(&library.db).await?, faces_before);
    assert_eq!(store_stats(&library.db).await?, stats_before);
    assert!(
        rx.drain()
            .contains(&StatusEvent::info("No new or modified files to process."))
    );

    // Forcing a rescan processes everything again
    let (tx, _rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing().with_force_rescan(true), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_processed, 2);
    assert_eq!(provider.calls().len(), calls_after_first + 2);
    Ok(())
}

#[tokio::test]
async fn test_modified_file_is_reprocessed() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg"])?;
    let provider = Arc::new(StaticProvider::new());

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;

    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(library.photo("a.jpg"))?
        .set_modified(later)?;

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_to_process, 1);
    assert_eq!(summary.files_skipped, 1);
    // Modified files count toward the estimate, not just unseen ones
    assert!(
        rx.drain()
            .contains(&StatusEvent::info("Estimated 1 files need processing."))
    );
    assert_eq!(provider.call_count(&library.photo("a.jpg")), 2);
    assert_eq!(provider.call_count(&library.photo("b.jpg")), 1);
    Ok(())
}

#[tokio::test]
async fn test_reindex_replaces_previous_faces() -> Result<()> {
    let library = Library::new(&["group.jpg"])?;
    let store = Arc::new(SqliteFaceStore::open(&library.db).await?);

    let three = Arc::new(
        StaticProvider::new().with_embeddings("group.jpg", vec![face(0.1), face(0.2), face(0.3)]),
    );
    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), three, tx)
        .run_with_store(store.clone())
        .await?;
    assert_eq!(store.face_records(&library.photo("group.jpg")).await?.len(), 3);

    let one = Arc::new(StaticProvider::new().with_embeddings("group.jpg", vec![face(0.9)]));
    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing().with_force_rescan(true), one, tx)
        .run_with_store(store.clone())
        .await?;

    let records = store.face_records(&library.photo("group.jpg")).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].embedding, face(0.9));
    assert_eq!(store.stats().await?.face_rows, 1);
    store.close().await;
    Ok(())
}

#[tokio::test]
async fn test_unreadable_photo_is_counted_and_run_completes() -> Result<()> {
    let library = Library::new(&["a.jpg", "broken.jpg"])?;
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("a.jpg", vec![face(0.1)])
            .with_failure("broken.jpg", "cannot identify image file"),
    );

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.processing_errors, 1);

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Error { message } if message.contains("broken.jpg")
    )));
    assert_eq!(events.last(), Some(&StatusEvent::Completed));
    assert_eq!(terminal_count(&events), 1);

    // The failed file left nothing behind and is retried next time
    let (tx, _rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_to_process, 1);
    assert_eq!(provider.call_count(&library.photo("broken.jpg")), 2);
    Ok(())
}

/// Delegates to SQLite but refuses to commit one path
struct FlakyStore {
    inner: SqliteFaceStore,
    refuse: PathBuf,
}

#[async_trait]
impl FaceStore for FlakyStore {
    async fn snapshot(&self) -> Result<IndexedSnapshot> {
        self.inner.snapshot().await
    }

    async fn replace_file_faces(
        &self,
        path: &Path,
        outcome: Option<&ProcessedFile>,
    ) -> Result<usize> {
        if path == self.refuse {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.replace_file_faces(path, outcome).await
    }

    async fn load_embeddings(&self) -> Result<Vec<StoredFace>> {
        self.inner.load_embeddings().await
    }

    async fn face_records(&self, path: &Path) -> Result<Vec<FaceRecord>> {
        self.inner.face_records(path).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }

    async fn list_files(&self, limit: usize) -> Result<Vec<IndexedFile>> {
        self.inner.list_files(limit).await
    }
}

#[tokio::test]
async fn test_commit_failure_is_counted_per_file() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg"])?;
    let store = Arc::new(FlakyStore {
        inner: SqliteFaceStore::open_memory().await?,
        refuse: library.photo("b.jpg"),
    });
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("a.jpg", vec![face(0.1)])
            .with_embeddings("b.jpg", vec![face(0.2)]),
    );

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing(), provider, tx)
        .run_with_store(store.clone())
        .await?;
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.database_errors, 1);
    assert_eq!(summary.faces_stored, 1);

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Error { message } if message.starts_with("Database error updating")
    )));
    assert_eq!(events.last(), Some(&StatusEvent::Completed));
    assert!(store.face_records(&library.photo("b.jpg")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_every_file_processed_once_with_many_workers() -> Result<()> {
    let names: Vec<String> = (0..24).map(|i| format!("img{i:02}.jpg")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let library = Library::new(&name_refs)?;
    let provider = names.iter().enumerate().fold(StaticProvider::new(), |p, (i, name)| {
        p.with_embeddings(name.clone(), vec![face(i as f64)])
    });
    let provider = Arc::new(provider);

    let (tx, rx) = status_channel();
    let summary = IndexingEngine::new(library.indexing().with_max_workers(8), provider.clone(), tx)
        .run()
        .await?;
    assert_eq!(summary.files_processed, 24);
    assert_eq!(summary.faces_stored, 24);
    for name in &names {
        assert_eq!(provider.call_count(&library.photo(name)), 1, "{name}");
    }

    let progress = rx
        .drain()
        .into_iter()
        .filter(|e| matches!(e, StatusEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 24);
    Ok(())
}

#[tokio::test]
async fn test_search_empty_store_completes_without_matches() -> Result<()> {
    let library = Library::new(&[])?;
    let reference = library.reference("me.jpg")?;
    SqliteFaceStore::open(&library.db).await?.close().await;
    let provider = Arc::new(StaticProvider::new().with_embeddings("me.jpg", vec![face(0.0)]));

    let (tx, rx) = status_channel();
    let outcome = FaceMatcher::new(SearchConfig::new(&library.db, &reference), provider.clone(), tx)
        .run()
        .await?;
    assert!(outcome.matches.is_empty());
    // No reason to look at the reference when there is nothing to compare against
    assert!(provider.calls().is_empty());

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Warning { .. })));
    assert_eq!(events.last(), Some(&StatusEvent::Completed));
    Ok(())
}

#[tokio::test]
async fn test_search_without_store_aborts() -> Result<()> {
    let library = Library::new(&[])?;
    let reference = library.reference("me.jpg")?;
    let provider = Arc::new(StaticProvider::new());

    let (tx, rx) = status_channel();
    let err = FaceMatcher::new(SearchConfig::new(&library.db, &reference), provider, tx)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::StoreNotFound(_))
    ));
    assert!(!library.db.exists());

    let events = rx.drain();
    assert!(matches!(events.last(), Some(StatusEvent::Aborted { .. })));
    assert_eq!(terminal_count(&events), 1);
    Ok(())
}

#[tokio::test]
async fn test_search_missing_reference_aborts() -> Result<()> {
    let library = Library::new(&[])?;
    SqliteFaceStore::open(&library.db).await?.close().await;
    let provider = Arc::new(StaticProvider::new());

    let (tx, rx) = status_channel();
    let missing = library.photo("nobody.jpg");
    let err = FaceMatcher::new(SearchConfig::new(&library.db, &missing), provider.clone(), tx)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::ReferenceImageNotFound(_))
    ));
    assert!(provider.calls().is_empty());
    assert!(matches!(rx.drain().last(), Some(StatusEvent::Aborted { .. })));
    Ok(())
}

#[tokio::test]
async fn test_reference_without_faces_aborts() -> Result<()> {
    let library = Library::new(&["a.jpg"])?;
    let reference = library.reference("landscape.jpg")?;
    let provider = Arc::new(StaticProvider::new().with_embeddings("a.jpg", vec![face(0.0)]));

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;

    let (tx, rx) = status_channel();
    let result = FaceMatcher::new(SearchConfig::new(&library.db, &reference), provider, tx)
        .run()
        .await;
    assert!(result.is_err());

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Error { message } if message.starts_with("No faces found in the reference image")
    )));
    assert!(!events.iter().any(|e| matches!(e, StatusEvent::Match { .. })));
    assert!(matches!(events.last(), Some(StatusEvent::Aborted { .. })));
    Ok(())
}

#[tokio::test]
async fn test_group_reference_uses_first_face() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg"])?;
    let reference = library.reference("group.jpg")?;
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("a.jpg", vec![face(0.0)])
            .with_embeddings("b.jpg", vec![face(5.0)])
            .with_embeddings("group.jpg", vec![face(0.1), face(5.0)]),
    );

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;

    let (tx, rx) = status_channel();
    let outcome = FaceMatcher::new(SearchConfig::new(&library.db, &reference), provider, tx)
        .run()
        .await?;
    assert_eq!(outcome.reference_faces, 2);
    assert_eq!(outcome.matches, vec![library.photo("a.jpg")]);
    assert!(rx.drain().iter().any(|e| matches!(
        e,
        StatusEvent::Warning { message } if message.contains("Using the first one")
    )));
    Ok(())
}

#[tokio::test]
async fn test_file_listed_once_when_several_faces_match() -> Result<()> {
    let library = Library::new(&["group.jpg"])?;
    let reference = library.reference("me.jpg")?;
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("group.jpg", vec![face(0.1), face(3.0), face(0.2)])
            .with_embeddings("me.jpg", vec![face(0.0)]),
    );

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;

    let (tx, rx) = status_channel();
    let outcome = FaceMatcher::new(SearchConfig::new(&library.db, &reference), provider, tx)
        .run()
        .await?;
    assert_eq!(outcome.faces_compared, 3);
    assert_eq!(outcome.matches, vec![library.photo("group.jpg")]);
    let match_events = rx
        .drain()
        .into_iter()
        .filter(|e| matches!(e, StatusEvent::Match { .. }))
        .count();
    assert_eq!(match_events, 1);
    Ok(())
}

#[tokio::test]
async fn test_tolerance_boundary() -> Result<()> {
    let library = Library::new(&["near.jpg", "edge.jpg", "far.jpg"])?;
    let reference = library.reference("me.jpg")?;
    let provider = Arc::new(
        StaticProvider::new()
            .with_embeddings("near.jpg", vec![face(0.25)])
            .with_embeddings("edge.jpg", vec![face(0.5)])
            .with_embeddings("far.jpg", vec![face(0.75)])
            .with_embeddings("me.jpg", vec![face(0.0)]),
    );

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider.clone(), tx)
        .run()
        .await?;

    let (tx, _rx) = status_channel();
    let search = SearchConfig::new(&library.db, &reference).with_tolerance(0.5);
    let outcome = FaceMatcher::new(search, provider.clone(), tx).run().await?;
    assert_eq!(
        outcome.matches,
        vec![library.photo("edge.jpg"), library.photo("near.jpg")]
    );

    let (tx, rx) = status_channel();
    let search = SearchConfig::new(&library.db, &reference).with_tolerance(1.0);
    assert!(FaceMatcher::new(search, provider, tx).run().await.is_err());
    assert!(matches!(rx.drain().last(), Some(StatusEvent::Aborted { .. })));
    Ok(())
}

/// Panics on one file, standing in for a crashed worker
struct PanickingProvider {
    inner: StaticProvider,
    poison: &'static str,
}

#[async_trait]
impl FaceEmbeddingProvider for PanickingProvider {
    async fn detect_and_embed(
        &self,
        image: &Path,
        model: DetectionModel,
    ) -> face_finder_embed::Result<Vec<FaceDetection>> {
        if image.file_name().and_then(|n| n.to_str()) == Some(self.poison) {
            panic!("native library crashed");
        }
        self.inner.detect_and_embed(image, model).await
    }

    fn provider_name(&self) -> &str {
        "panicking"
    }
}

#[tokio::test]
async fn test_worker_crash_aborts_run() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg", "c.jpg"])?;
    let provider = Arc::new(PanickingProvider {
        inner: StaticProvider::new(),
        poison: "b.jpg",
    });

    let (tx, rx) = status_channel();
    let result = IndexingEngine::new(library.indexing(), provider, tx).run().await;
    assert!(result.is_err());

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Fatal { .. })));
    assert!(matches!(events.last(), Some(StatusEvent::Aborted { .. })));
    assert_eq!(terminal_count(&events), 1);
    Ok(())
}

#[tokio::test]
async fn test_unlaunchable_provider_aborts_and_keeps_index() -> Result<()> {
    let library = Library::new(&["a.jpg", "b.jpg", "c.jpg"])?;
    let provider = Arc::new(StaticProvider::new().with_embeddings("a.jpg", vec![face(0.1)]));

    let (tx, _rx) = status_channel();
    IndexingEngine::new(library.indexing(), provider, tx)
        .run()
        .await?;
    let faces_before = stored_faces(&library.db).await?;
    let stats_before = store_stats(&library.db).await?;
    assert_eq!(faces_before.len(), 1);

    let missing = Arc::new(CommandProvider::new(EmbedConfig::with_command(
        "/nonexistent/face-embed",
    ))?);
    let (tx, rx) = status_channel();
    let result = IndexingEngine::new(library.indexing().with_force_rescan(true), missing, tx)
        .run()
        .await;
    assert!(result.is_err());

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Fatal { message } if message.contains("face provider unavailable")
    )));
    assert!(matches!(events.last(), Some(StatusEvent::Aborted { .. })));
    assert_eq!(terminal_count(&events), 1);
    assert!(!events.contains(&StatusEvent::Completed));

    assert_eq!(stored_faces(&library.db).await?, faces_before);
    assert_eq!(store_stats(&library.db).await?, stats_before);
    Ok(())
}
