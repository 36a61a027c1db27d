// Fluent builder APIs for the core entities, mirroring the teacher's
// builder-pattern idiom with sensible defaults and validation at `build()`.

use anyhow::{ensure, Result};
use chrono::Utc;
use std::collections::HashMap;

use crate::contracts::{Chunk, ConnectorInstance, HealthStatus, KbDocument, Source};
use crate::types::{
    ConnectorStatus, SourceKind, SourceStatus, SyncMode, ValidatedChunkId, ValidatedDocumentId,
    ValidatedInstanceId, ValidatedPath, ValidatedPattern, ValidatedSourceId, ValidatedTitle,
};

pub struct SourceBuilder {
    display_name: Option<String>,
    root_path: Option<ValidatedPath>,
    kind: SourceKind,
    include_patterns: Vec<ValidatedPattern>,
    exclude_patterns: Vec<ValidatedPattern>,
    sync_mode: SyncMode,
}

impl Default for SourceBuilder {
    fn default() -> Self {
        Self {
            display_name: None,
            root_path: None,
            kind: SourceKind::Folder,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            sync_mode: SyncMode::Manual,
        }
    }
}

impl SourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn root_path(mut self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        self.root_path = Some(ValidatedPath::new(path)?);
        Ok(self)
    }

    pub fn kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include_patterns.push(ValidatedPattern::new(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude_patterns.push(ValidatedPattern::new(pattern)?);
        Ok(self)
    }

    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    pub fn build(self) -> Result<Source> {
        let display_name = self.display_name.ok_or_else(|| anyhow::anyhow!("display_name is required"))?;
        let root_path = self.root_path.ok_or_else(|| anyhow::anyhow!("root_path is required"))?;
        Ok(Source::new(display_name, root_path, self.kind, self.include_patterns, self.exclude_patterns, self.sync_mode))
    }
}

pub struct DocumentBuilder {
    id: Option<ValidatedDocumentId>,
    source_id: Option<ValidatedSourceId>,
    path: Option<ValidatedPath>,
    title: Option<ValidatedTitle>,
    mime: Option<String>,
    size: u64,
    content_hash: Option<[u8; 32]>,
    metadata: HashMap<String, String>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self {
            id: None,
            source_id: None,
            path: None,
            title: None,
            mime: None,
            size: 0,
            content_hash: None,
            metadata: HashMap::new(),
        }
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: ValidatedDocumentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn source_id(mut self, id: ValidatedSourceId) -> Self {
        self.source_id = Some(id);
        self
    }

    pub fn path(mut self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        self.path = Some(ValidatedPath::new(path)?);
        Ok(self)
    }

    pub fn title(mut self, title: impl Into<String>) -> Result<Self> {
        self.title = Some(ValidatedTitle::new(title)?);
        Ok(self)
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn content_hash(mut self, hash: [u8; 32], size: u64) -> Self {
        self.content_hash = Some(hash);
        self.size = size;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<KbDocument> {
        let source_id = self.source_id.ok_or_else(|| anyhow::anyhow!("source_id is required"))?;
        let path = self.path.ok_or_else(|| anyhow::anyhow!("path is required"))?;
        let title = self.title.ok_or_else(|| anyhow::anyhow!("title is required"))?;
        let content_hash = self.content_hash.ok_or_else(|| anyhow::anyhow!("content_hash is required"))?;
        let now = Utc::now();
        Ok(KbDocument {
            id: self.id.unwrap_or_default(),
            source_id,
            path,
            title,
            mime: self.mime.unwrap_or_else(|| "text/plain".to_string()),
            size: self.size,
            modified_at: now,
            indexed_at: now,
            content_hash,
            chunk_count: 0,
            metadata: self.metadata,
        })
    }
}

pub struct ChunkBuilder {
    id: Option<ValidatedChunkId>,
    document_id: Option<ValidatedDocumentId>,
    index: usize,
    content: Option<String>,
    start_offset: usize,
    end_offset: usize,
    metadata: HashMap<String, String>,
}

impl Default for ChunkBuilder {
    fn default() -> Self {
        Self {
            id: None,
            document_id: None,
            index: 0,
            content: None,
            start_offset: 0,
            end_offset: 0,
            metadata: HashMap::new(),
        }
    }
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(mut self, id: ValidatedDocumentId) -> Self {
        self.document_id = Some(id);
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn offsets(mut self, start: usize, end: usize) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Chunk> {
        let document_id = self.document_id.ok_or_else(|| anyhow::anyhow!("document_id is required"))?;
        let content = self.content.ok_or_else(|| anyhow::anyhow!("content is required"))?;
        ensure!(self.end_offset >= self.start_offset, "end_offset must be >= start_offset");
        let id = self.id.unwrap_or_else(|| {
            let hash_prefix = format!("{:x}", xxhash_rust::xxh3::xxh3_64(content.as_bytes()))[..8].to_string();
            ValidatedChunkId::derive(document_id, self.index, &hash_prefix)
        });
        Ok(Chunk { id, document_id, index: self.index, content, start_offset: self.start_offset, end_offset: self.end_offset, metadata: self.metadata })
    }
}

pub struct ConnectorInstanceBuilder {
    package_id: Option<String>,
    package_version: Option<String>,
    display_name: Option<String>,
    image_reference: Option<String>,
    config: HashMap<String, String>,
}

impl Default for ConnectorInstanceBuilder {
    fn default() -> Self {
        Self { package_id: None, package_version: None, display_name: None, image_reference: None, config: HashMap::new() }
    }
}

impl ConnectorInstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.package_id = Some(id.into());
        self.package_version = Some(version.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn image_reference(mut self, image: impl Into<String>) -> Self {
        self.image_reference = Some(image.into());
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ConnectorInstance> {
        let package_id = self.package_id.ok_or_else(|| anyhow::anyhow!("package_id is required"))?;
        let package_version = self.package_version.ok_or_else(|| anyhow::anyhow!("package_version is required"))?;
        let image_reference = self.image_reference.ok_or_else(|| anyhow::anyhow!("image_reference is required"))?;
        let now = Utc::now();
        Ok(ConnectorInstance {
            id: ValidatedInstanceId::new(),
            display_name: self.display_name.unwrap_or_else(|| package_id.clone()),
            package_id,
            package_version,
            status: ConnectorStatus::Created,
            container_id: None,
            image_reference,
            config: self.config,
            granted_permissions: None,
            audit_result: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            stopped_at: None,
            health_status: HealthStatus::Unknown,
            last_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_builder_requires_display_name_and_path() {
        assert!(SourceBuilder::new().build().is_err());
        let source = SourceBuilder::new()
            .display_name("docs")
            .root_path("/tmp/docs")
            .unwrap()
            .include("**/*.md")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(source.status, SourceStatus::Active);
    }

    #[test]
    fn chunk_builder_derives_deterministic_id_from_content() {
        let document_id = ValidatedDocumentId::new();
        let a = ChunkBuilder::new().document_id(document_id).index(0).content("hello").offsets(0, 5).build().unwrap();
        let b = ChunkBuilder::new().document_id(document_id).index(0).content("hello").offsets(0, 5).build().unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn connector_instance_builder_defaults_to_created() {
        let instance =
            ConnectorInstanceBuilder::new().package("acme/tool", "1.0.0").image_reference("acme/tool:1.0.0").build().unwrap();
        assert_eq!(instance.status, ConnectorStatus::Created);
        assert!(instance.granted_permissions.is_none());
    }
}
