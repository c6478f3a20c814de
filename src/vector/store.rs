use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::TornadoError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Keyed storage for source documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces the document with the same id.
    async fn put(&self, document: Document) -> Result<(), TornadoError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, TornadoError>;

    /// Returns `true` when a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, TornadoError>;

    /// All stored ids in ascending order.
    async fn list_ids(&self) -> Result<Vec<String>, TornadoError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, document: Document) -> Result<(), TornadoError> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, TornadoError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, TornadoError> {
        Ok(self.documents.write().await.remove(id).is_some())
    }

    async fn list_ids(&self) -> Result<Vec<String>, TornadoError> {
        let mut ids: Vec<String> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One `<encoded id>.json` file per document under a directory.
///
/// Ids are escaped so any string maps to a safe, reversible file name.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    /// Opens `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TornadoError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| storage_error("create directory", &root, err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_id(id)))
    }
}

fn storage_error(action: &str, path: &Path, err: impl std::fmt::Display) -> TornadoError {
    TornadoError::storage(format!("{action} {}: {err}", path.display()))
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn put(&self, document: Document) -> Result<(), TornadoError> {
        if document.id.is_empty() {
            return Err(TornadoError::validation("document id must not be empty"));
        }
        let path = self.path_for(&document.id);
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|err| storage_error("serialize", &path, err))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|err| storage_error("write", &tmp, err))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| storage_error("rename", &path, err))?;
        tracing::debug!(id = %document.id, path = %path.display(), "stored document");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, TornadoError> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error("read", &path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| storage_error("parse", &path, err))
    }

    async fn delete(&self, id: &str) -> Result<bool, TornadoError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(storage_error("remove", &path, err)),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, TornadoError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|err| storage_error("list", &self.root, err))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| storage_error("list", &self.root, err))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            match decode_id(stem) {
                Some(id) => ids.push(id),
                None => tracing::warn!(file = %stem, "skipping file with undecodable name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// ASCII letters, digits and `-` pass through; every other byte becomes `_xx`.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

fn decode_id(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut iter = name.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'_' {
            let hex = [iter.next()?, iter.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}
