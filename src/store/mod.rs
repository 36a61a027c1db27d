// Persistent Store (spec.md §4.1): the single source of truth for all
// durable metadata plus the lexical full-text index over chunk content.
//
// Layout under the data directory, mirroring the teacher's `file_storage.rs`
// directory convention: one subdirectory per entity kind holding one
// zstd-compressed bincode record per id, a `wal/` directory holding the
// append-only write log, and `meta/version` tracking the schema version.

pub mod lexical;
pub mod migrations;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::contracts::{
    ClientBinding, ConnectorInstance, KbDocument, LexicalHit, Source, Store, StoreStats,
};
use crate::errors::{ConduitError, Result};
use crate::types::{
    ValidatedBindingId, ValidatedChunkId, ValidatedDocumentId, ValidatedInstanceId,
    ValidatedSourceId,
};

use lexical::LexicalIndex;

const SNIPPET_RADIUS: usize = 120;

fn entity_path(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{id}.bin"))
}

async fn write_record<T: Serialize>(dir: &Path, id: Uuid, value: &T) -> anyhow::Result<()> {
    fs::create_dir_all(dir).await?;
    let encoded = bincode::serialize(value).context("serializing record")?;
    let compressed = zstd::encode_all(encoded.as_slice(), 0).context("compressing record")?;
    let path = entity_path(dir, id);
    let tmp_path = path.with_extension("bin.tmp");
    fs::write(&tmp_path, compressed).await?;
    fs::rename(&tmp_path, &path).await?;
    Ok(())
}

async fn remove_record(dir: &Path, id: Uuid) -> anyhow::Result<()> {
    let path = entity_path(dir, id);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn load_all<T: for<'a> Deserialize<'a>>(dir: &Path) -> anyhow::Result<Vec<(Uuid, T)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir).await?;
    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let Ok(id) = Uuid::parse_str(stem) else { continue };
        let compressed = fs::read(&path).await?;
        let decoded = match zstd::decode_all(compressed.as_slice()) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let Ok(value) = bincode::deserialize::<T>(&decoded) else { continue };
        records.push((id, value));
    }
    Ok(records)
}

fn snippet_around(content: &str, query: &str, start_offset: usize) -> String {
    let lower_content = content.to_lowercase();
    let first_term = query.split_whitespace().next().unwrap_or("").to_lowercase();

    let match_pos = if first_term.is_empty() { None } else { lower_content.find(&first_term) };

    let center = match_pos.unwrap_or(0);
    let from = center.saturating_sub(SNIPPET_RADIUS);
    let to = (center + SNIPPET_RADIUS).min(content.len());

    // Clamp to UTF-8 char boundaries.
    let from = (from..=center).find(|&i| content.is_char_boundary(i)).unwrap_or(0);
    let to = (to..=content.len()).find(|&i| content.is_char_boundary(i)).unwrap_or(content.len());

    let _ = start_offset;
    content[from..to].to_string()
}

/// File-based `Store` implementation: an in-memory index over on-disk
/// records, matching the teacher's `FileStorage` convention.
pub struct FileStore {
    root: PathBuf,
    sources: DashMap<Uuid, Source>,
    documents: DashMap<Uuid, KbDocument>,
    chunks: DashMap<Uuid, crate::contracts::Chunk>,
    doc_chunk_order: DashMap<Uuid, Vec<Uuid>>,
    instances: DashMap<Uuid, ConnectorInstance>,
    bindings: DashMap<Uuid, ClientBinding>,
    lexical: RwLock<LexicalIndex>,
    wal: Mutex<Option<fs::File>>,
    dirty_ops: AtomicU64,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        crate::validation::validate_storage_path(
            root.to_str().ok_or_else(|| anyhow::anyhow!("store path is not valid UTF-8"))?,
        )
        .map_err(ConduitError::from)?;

        let store = Self {
            root: root.clone(),
            sources: DashMap::new(),
            documents: DashMap::new(),
            chunks: DashMap::new(),
            doc_chunk_order: DashMap::new(),
            instances: DashMap::new(),
            bindings: DashMap::new(),
            lexical: RwLock::new(LexicalIndex::new()),
            wal: Mutex::new(None),
            dirty_ops: AtomicU64::new(0),
        };

        store.ensure_directories().await.map_err(ConduitError::from)?;
        store.init_wal().await.map_err(ConduitError::from)?;
        store.load_existing().await.map_err(ConduitError::from)?;
        Ok(store)
    }

    fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }
    fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }
    fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }
    fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }
    fn bindings_dir(&self) -> PathBuf {
        self.root.join("bindings")
    }
    fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }
    fn wal_dir(&self) -> PathBuf {
        self.root.join("wal")
    }

    async fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [
            self.sources_dir(),
            self.documents_dir(),
            self.chunks_dir(),
            self.instances_dir(),
            self.bindings_dir(),
            self.meta_dir(),
            self.wal_dir(),
        ] {
            fs::create_dir_all(&dir).await.with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    async fn init_wal(&self) -> anyhow::Result<()> {
        let wal_path = self.wal_dir().join("current.wal");
        let file = fs::OpenOptions::new().create(true).append(true).open(&wal_path).await?;
        *self.wal.lock().await = Some(file);
        Ok(())
    }

    async fn append_wal(&self, entry: &str) -> anyhow::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut guard = self.wal.lock().await;
        if let Some(file) = guard.as_mut() {
            file.write_all(entry.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        self.dirty_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn load_existing(&self) -> anyhow::Result<()> {
        migrations::run(&self.meta_dir()).await?;

        for (id, source) in load_all::<Source>(&self.sources_dir()).await? {
            self.sources.insert(id, source);
        }
        for (id, document) in load_all::<KbDocument>(&self.documents_dir()).await? {
            self.documents.insert(id, document);
        }
        for (id, instance) in load_all::<ConnectorInstance>(&self.instances_dir()).await? {
            self.instances.insert(id, instance);
        }
        for (id, binding) in load_all::<ClientBinding>(&self.bindings_dir()).await? {
            self.bindings.insert(id, binding);
        }

        let mut index = self.lexical.write().await;
        for (id, chunk) in load_all::<crate::contracts::Chunk>(&self.chunks_dir()).await? {
            self.doc_chunk_order.entry(chunk.document_id.as_uuid()).or_default().push(id);
            index.index_chunk(chunk.id, &chunk.content);
            self.chunks.insert(id, chunk);
        }
        for mut entry in self.doc_chunk_order.iter_mut() {
            entry.value_mut().sort_by_key(|id| self.chunks.get(id).map(|c| c.index).unwrap_or(0));
        }

        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn create_source(&self, source: Source) -> Result<()> {
        let id = source.id.as_uuid();
        if self.sources.contains_key(&id) {
            return Err(ConduitError::SourceExists(source.id.to_string()));
        }
        write_record(&self.sources_dir(), id, &source).await.map_err(ConduitError::from)?;
        self.append_wal(&format!("create_source:{id}")).await.map_err(ConduitError::from)?;
        self.sources.insert(id, source);
        Ok(())
    }

    async fn get_source(&self, id: ValidatedSourceId) -> Result<Option<Source>> {
        Ok(self.sources.get(&id.as_uuid()).map(|r| r.clone()))
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.iter().map(|r| r.value().clone()).collect())
    }

    async fn update_source(&self, source: Source) -> Result<()> {
        let id = source.id.as_uuid();
        if !self.sources.contains_key(&id) {
            return Err(ConduitError::SourceNotFound(source.id.to_string()));
        }
        write_record(&self.sources_dir(), id, &source).await.map_err(ConduitError::from)?;
        self.sources.insert(id, source);
        Ok(())
    }

    async fn delete_source(&self, id: ValidatedSourceId) -> Result<()> {
        let uuid = id.as_uuid();
        if self.sources.remove(&uuid).is_none() {
            return Err(ConduitError::SourceNotFound(id.to_string()));
        }
        remove_record(&self.sources_dir(), uuid).await.map_err(ConduitError::from)?;

        let doc_ids: Vec<Uuid> =
            self.documents.iter().filter(|r| r.value().source_id.as_uuid() == uuid).map(|r| *r.key()).collect();
        for doc_id in doc_ids {
            if let Ok(validated) = ValidatedDocumentId::from_uuid(doc_id) {
                self.delete_document(validated).await?;
            }
        }
        self.append_wal(&format!("delete_source:{uuid}")).await.map_err(ConduitError::from)?;
        Ok(())
    }

    async fn put_document(&self, document: KbDocument, chunks: Vec<crate::contracts::Chunk>) -> Result<()> {
        let doc_id = document.id.as_uuid();

        if let Some(old_ids) = self.doc_chunk_order.get(&doc_id).map(|r| r.value().clone()) {
            let mut index = self.lexical.write().await;
            for old_id in old_ids {
                if let Some((_, old_chunk)) = self.chunks.remove(&old_id) {
                    index.remove_chunk(old_chunk.id);
                }
                remove_record(&self.chunks_dir(), old_id).await.map_err(ConduitError::from)?;
            }
        }

        write_record(&self.documents_dir(), doc_id, &document).await.map_err(ConduitError::from)?;

        let mut new_ids = Vec::with_capacity(chunks.len());
        {
            let mut index = self.lexical.write().await;
            for chunk in &chunks {
                let chunk_id = chunk.id.as_uuid();
                write_record(&self.chunks_dir(), chunk_id, chunk).await.map_err(ConduitError::from)?;
                index.index_chunk(chunk.id, &chunk.content);
                new_ids.push(chunk_id);
            }
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            new_ids[i] = chunk.id.as_uuid();
            self.chunks.insert(chunk.id.as_uuid(), chunk);
        }
        self.doc_chunk_order.insert(doc_id, new_ids);
        self.documents.insert(doc_id, document);

        self.append_wal(&format!("put_document:{doc_id}")).await.map_err(ConduitError::from)?;
        Ok(())
    }

    async fn get_document(&self, id: ValidatedDocumentId) -> Result<Option<KbDocument>> {
        Ok(self.documents.get(&id.as_uuid()).map(|r| r.clone()))
    }

    async fn find_document_by_path(
        &self,
        source_id: ValidatedSourceId,
        path: &str,
    ) -> Result<Option<KbDocument>> {
        Ok(self
            .documents
            .iter()
            .find(|r| r.value().source_id == source_id && r.value().path.as_str() == path)
            .map(|r| r.value().clone()))
    }

    async fn list_documents(&self, source_id: Option<ValidatedSourceId>) -> Result<Vec<KbDocument>> {
        Ok(self
            .documents
            .iter()
            .filter(|r| source_id.map(|sid| r.value().source_id == sid).unwrap_or(true))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete_document(&self, id: ValidatedDocumentId) -> Result<()> {
        let doc_id = id.as_uuid();
        if self.documents.remove(&doc_id).is_none() {
            return Err(ConduitError::Other(anyhow::anyhow!("document {id} not found")));
        }
        remove_record(&self.documents_dir(), doc_id).await.map_err(ConduitError::from)?;

        if let Some((_, chunk_ids)) = self.doc_chunk_order.remove(&doc_id) {
            let mut index = self.lexical.write().await;
            for chunk_id in chunk_ids {
                if let Some((_, chunk)) = self.chunks.remove(&chunk_id) {
                    index.remove_chunk(chunk.id);
                }
                remove_record(&self.chunks_dir(), chunk_id).await.map_err(ConduitError::from)?;
            }
        }
        self.append_wal(&format!("delete_document:{doc_id}")).await.map_err(ConduitError::from)?;
        Ok(())
    }

    async fn list_chunks(&self, document_id: ValidatedDocumentId) -> Result<Vec<crate::contracts::Chunk>> {
        let Some(ids) = self.doc_chunk_order.get(&document_id.as_uuid()) else { return Ok(Vec::new()) };
        Ok(ids.iter().filter_map(|id| self.chunks.get(id).map(|r| r.value().clone())).collect())
    }

    async fn get_chunk(&self, id: ValidatedChunkId) -> Result<Option<crate::contracts::Chunk>> {
        Ok(self.chunks.get(&id.as_uuid()).map(|r| r.clone()))
    }

    async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
        source_filter: Option<ValidatedSourceId>,
    ) -> Result<Vec<LexicalHit>> {
        let index = self.lexical.read().await;
        let documents = &self.documents;
        let chunks = &self.chunks;

        let allowed = |chunk_id: ValidatedChunkId| -> bool {
            let Some(chunk) = chunks.get(&chunk_id.as_uuid()) else { return false };
            match source_filter {
                None => true,
                Some(sid) => documents.get(&chunk.document_id.as_uuid()).map(|d| d.source_id == sid).unwrap_or(false),
            }
        };
        let filter_fn: &dyn Fn(ValidatedChunkId) -> bool = &allowed;
        let ranked = index.search(query, Some(filter_fn));

        let mut hits = Vec::with_capacity(limit.min(ranked.len()));
        for (chunk_id, score) in ranked.into_iter().take(limit) {
            let Some(chunk) = self.chunks.get(&chunk_id.as_uuid()) else { continue };
            let Some(document) = self.documents.get(&chunk.document_id.as_uuid()) else { continue };
            hits.push(LexicalHit {
                chunk_id,
                document_id: chunk.document_id,
                path: document.path.as_str().to_string(),
                title: document.title.as_str().to_string(),
                snippet: snippet_around(&chunk.content, query, chunk.start_offset),
                score,
            });
        }
        Ok(hits)
    }

    async fn create_instance(&self, instance: ConnectorInstance) -> Result<()> {
        let id = instance.id.as_uuid();
        if self.instances.contains_key(&id) {
            return Err(ConduitError::InstanceExists(instance.id.to_string()));
        }
        write_record(&self.instances_dir(), id, &instance).await.map_err(ConduitError::from)?;
        self.instances.insert(id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: ValidatedInstanceId) -> Result<Option<ConnectorInstance>> {
        Ok(self.instances.get(&id.as_uuid()).map(|r| r.clone()))
    }

    async fn list_instances(&self) -> Result<Vec<ConnectorInstance>> {
        Ok(self.instances.iter().map(|r| r.value().clone()).collect())
    }

    async fn update_instance(&self, instance: ConnectorInstance) -> Result<()> {
        let id = instance.id.as_uuid();
        if !self.instances.contains_key(&id) {
            return Err(ConduitError::InstanceNotFound(instance.id.to_string()));
        }
        write_record(&self.instances_dir(), id, &instance).await.map_err(ConduitError::from)?;
        self.instances.insert(id, instance);
        Ok(())
    }

    async fn delete_instance(&self, id: ValidatedInstanceId) -> Result<()> {
        let uuid = id.as_uuid();
        if self.instances.remove(&uuid).is_none() {
            return Err(ConduitError::InstanceNotFound(id.to_string()));
        }
        remove_record(&self.instances_dir(), uuid).await.map_err(ConduitError::from)?;
        Ok(())
    }

    async fn create_binding(&self, binding: ClientBinding) -> Result<()> {
        let id = binding.id.as_uuid();
        write_record(&self.bindings_dir(), id, &binding).await.map_err(ConduitError::from)?;
        self.bindings.insert(id, binding);
        Ok(())
    }

    async fn list_bindings(&self, instance_id: ValidatedInstanceId) -> Result<Vec<ClientBinding>> {
        Ok(self.bindings.iter().filter(|r| r.value().instance_id == instance_id).map(|r| r.value().clone()).collect())
    }

    async fn update_binding(&self, binding: ClientBinding) -> Result<()> {
        let id = binding.id.as_uuid();
        write_record(&self.bindings_dir(), id, &binding).await.map_err(ConduitError::from)?;
        self.bindings.insert(id, binding);
        Ok(())
    }

    async fn delete_binding(&self, id: ValidatedBindingId) -> Result<()> {
        let uuid = id.as_uuid();
        self.bindings.remove(&uuid);
        remove_record(&self.bindings_dir(), uuid).await.map_err(ConduitError::from)?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            source_count: self.sources.len(),
            document_count: self.documents.len(),
            chunk_count: self.chunks.len(),
            instance_count: self.instances.len(),
            binding_count: self.bindings.len(),
        })
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.meta_dir()).await.map_err(ConduitError::from)
    }

    async fn sync(&self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut guard = self.wal.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush().await.map_err(|e| ConduitError::Other(e.into()))?;
        }
        Ok(())
    }
}
