// Source Manager (spec.md §4.7), grounded on `services/management_service.rs`
// (service-layer entrypoint shape) and `git/ingestion.rs` (progress-callback
// idiom, generalized from a single git walk to arbitrary folder sources via
// `walkdir` + `patterns::PatternMatcher`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, instrument, warn};
use walkdir::WalkDir;

use crate::contracts::{Source, Store};
use crate::errors::{ConduitError, Result};
use crate::events::{Event, EventBus};
use crate::indexer::{IndexDecision, IndexOptions, Indexer};
use crate::patterns::PatternMatcher;
use crate::types::{SourceKind, SourceStatus, ValidatedSourceId};

const DEFAULT_WORKER_COUNT: usize = 4;

/// Filesystem events are coalesced for this long before triggering a sync,
/// so a multi-file save (or a git checkout) doesn't fire one sync per file.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub rebuild_vectors: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncError {
    pub path: String,
    pub message: String,
}

/// Walks a registered source's root, applying exclude-then-include glob
/// matching (deny wins), and drives the Indexer over the bounded worker
/// pool spec.md §4.7 calls for.
pub struct SourceManager {
    store: Arc<dyn Store>,
    indexer: Arc<Indexer>,
    events: EventBus,
    worker_count: usize,
}

impl SourceManager {
    pub fn new(store: Arc<dyn Store>, indexer: Arc<Indexer>, events: EventBus) -> Self {
        Self { store, indexer, events, worker_count: DEFAULT_WORKER_COUNT }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    fn pattern_matcher(source: &Source) -> Result<PatternMatcher> {
        let include: Vec<String> = source.include_patterns.iter().map(|p| p.as_str().to_string()).collect();
        let exclude: Vec<String> = source.exclude_patterns.iter().map(|p| p.as_str().to_string()).collect();
        PatternMatcher::new(&include, &exclude).map_err(ConduitError::from)
    }

    fn candidate_files(root: &Path, matcher: &PatternMatcher) -> Vec<(String, std::path::PathBuf)> {
        let mut candidates = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else { continue };
            let Some(relative_str) = relative.to_str() else { continue };
            if matcher.is_match(relative_str) {
                candidates.push((relative_str.to_string(), entry.path().to_path_buf()));
            }
        }
        candidates
    }

    /// Runs a full sync for `source_id`: walks the tree, indexes every
    /// matching file through a bounded worker pool, prunes deleted
    /// documents, and persists `last_sync`/`status`/counters.
    #[instrument(skip(self))]
    pub async fn sync(&self, source_id: ValidatedSourceId, options: SyncOptions) -> Result<SyncReport> {
        let mut source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or_else(|| ConduitError::SourceNotFound(source_id.to_string()))?;

        self.events.publish(Event::SyncStarted { source_id });

        source.status = SourceStatus::Syncing;
        self.store.update_source(source.clone()).await?;

        let root = source.root_path.as_path().to_path_buf();
        if source.kind == SourceKind::Git {
            if let Err(err) = Self::fast_forward_git_tree(&root) {
                warn!(path = %root.display(), error = %err, "git fast-forward failed, syncing tree as-is");
            }
        }

        let matcher = Self::pattern_matcher(&source)?;
        let candidates = Self::candidate_files(&root, &matcher);
        let total = candidates.len();

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut handles = Vec::with_capacity(candidates.len());

        for (relative_path, absolute_path) in candidates.iter().cloned() {
            let semaphore = semaphore.clone();
            let indexer = self.indexer.clone();
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = match tokio::fs::read(&absolute_path).await {
                    Ok(bytes) => indexer.index_document(&source, &relative_path, &absolute_path, &bytes, options_to_index(options)).await,
                    Err(e) => Err(ConduitError::PathNotReadable(format!("{relative_path}: {e}"))),
                };
                (relative_path, outcome)
            }));
        }

        let mut report = SyncReport::default();
        let mut processed = 0usize;
        for handle in handles {
            let (relative_path, outcome) = handle.await.map_err(|e| ConduitError::IndexFailed(e.to_string()))?;
            processed += 1;
            self.events.publish(Event::SyncProgress { source_id, processed, total });
            match outcome {
                Ok(outcome) => match outcome.decision {
                    IndexDecision::Added => report.added += 1,
                    IndexDecision::Updated => report.updated += 1,
                    IndexDecision::Skipped => report.skipped += 1,
                },
                Err(err) => {
                    warn!(path = %relative_path, error = %err, "failed to index file during sync");
                    report.errors.push(SyncError { path: relative_path, message: err.to_string() });
                }
            }
        }

        let seen_paths: HashSet<String> = candidates.into_iter().map(|(path, _)| path).collect();
        match self.indexer.prune_deleted(source_id, &seen_paths).await {
            Ok(deleted) => report.deleted = deleted,
            Err(err) => {
                error!(error = %err, "failed to prune deleted documents during sync");
                report.errors.push(SyncError { path: String::new(), message: err.to_string() });
            }
        }

        source.status = if report.errors.is_empty() { SourceStatus::Active } else { SourceStatus::Error };
        source.last_sync = Some(Utc::now());
        self.refresh_counters(&mut source).await?;
        self.store.update_source(source).await?;

        self.events.publish(Event::SyncCompleted {
            source_id,
            added: report.added,
            updated: report.updated,
            deleted: report.deleted,
            errors: report.errors.len(),
        });

        Ok(report)
    }

    async fn refresh_counters(&self, source: &mut Source) -> Result<()> {
        let documents = self.store.list_documents(Some(source.id)).await?;
        let mut chunk_count = 0usize;
        let mut byte_count = 0u64;
        for document in &documents {
            chunk_count += document.chunk_count;
            byte_count += document.size;
        }
        source.document_count = documents.len();
        source.chunk_count = chunk_count;
        source.byte_count = byte_count;
        Ok(())
    }

    /// Fetches `origin` and fast-forwards the checked-out branch, for
    /// `SourceKind::Git` sources. Never clones: the root path is expected
    /// to already be a checkout (cloning a remote is the client-adapter's
    /// job, out of scope here).
    #[cfg(feature = "git-integration")]
    fn fast_forward_git_tree(root: &Path) -> Result<()> {
        let repo = git2::Repository::open(root).map_err(|e| ConduitError::Other(e.into()))?;
        let mut remote = repo.find_remote("origin").map_err(|e| ConduitError::Other(e.into()))?;
        remote.fetch(&[] as &[&str], None, None).map_err(|e| ConduitError::Other(e.into()))?;

        let head = repo.head().map_err(|e| ConduitError::Other(e.into()))?;
        let branch = head.shorthand().ok_or_else(|| ConduitError::Other(anyhow::anyhow!("detached HEAD, skipping fast-forward")))?;
        let upstream_ref = format!("refs/remotes/origin/{branch}");
        let upstream_commit = repo.find_reference(&upstream_ref).and_then(|r| r.peel_to_commit()).map_err(|e| ConduitError::Other(e.into()))?;

        let analysis = repo.merge_analysis(&[&repo.find_annotated_commit(upstream_commit.id()).map_err(|e| ConduitError::Other(e.into()))?]).map_err(|e| ConduitError::Other(e.into()))?;
        if !analysis.0.is_fast_forward() {
            return Ok(());
        }

        let mut local_ref = repo.find_reference(&format!("refs/heads/{branch}")).map_err(|e| ConduitError::Other(e.into()))?;
        local_ref.set_target(upstream_commit.id(), "fast-forward via source sync").map_err(|e| ConduitError::Other(e.into()))?;
        repo.set_head(&format!("refs/heads/{branch}")).map_err(|e| ConduitError::Other(e.into()))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force())).map_err(|e| ConduitError::Other(e.into()))?;
        Ok(())
    }

    #[cfg(not(feature = "git-integration"))]
    fn fast_forward_git_tree(_root: &Path) -> Result<()> {
        Err(ConduitError::ValidationError("git sources require the git-integration feature".to_string()))
    }

    /// Watches `source_id`'s root for filesystem changes, debouncing bursts
    /// into a single sync. The returned watcher must be kept alive by the
    /// caller for as long as watching should continue; dropping it stops
    /// the watch (spec.md §3's `sync_mode: watch`).
    pub fn watch(self: Arc<Self>, source_id: ValidatedSourceId, root: PathBuf) -> Result<RecommendedWatcher> {
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.try_send(());
            }
        })
        .map_err(|e| ConduitError::Other(e.into()))?;
        watcher.watch(&root, RecursiveMode::Recursive).map_err(|e| ConduitError::Other(e.into()))?;

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(WATCH_DEBOUNCE).await;
                while rx.try_recv().is_ok() {}
                if let Err(err) = self.sync(source_id, SyncOptions::default()).await {
                    error!(source_id = %source_id, error = %err, "watch-triggered sync failed");
                }
            }
        });

        Ok(watcher)
    }
}

fn options_to_index(options: SyncOptions) -> IndexOptions {
    IndexOptions { rebuild_vectors: options.rebuild_vectors }
}
