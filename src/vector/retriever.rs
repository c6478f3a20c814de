use std::sync::Arc;

use serde_json::Value;

use crate::error::TornadoError;

use super::chunker::TextChunker;
use super::database::{MetadataFilter, VectorDatabase, VectorRecord};
use super::embeddings::Embedder;
use super::store::{Document, DocumentStore};

const DOCUMENT_ID: &str = "document_id";
const CHUNK_INDEX: &str = "chunk_index";
const CHUNK_TEXT: &str = "text";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

/// Chunks, embeds and indexes documents, then answers similarity queries.
///
/// Chunk records are keyed `<document id>#<chunk index>`.
pub struct Retriever {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    database: Arc<dyn VectorDatabase>,
    documents: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        database: Arc<dyn VectorDatabase>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            database,
            documents,
        }
    }

    /// Indexes `document`, replacing any earlier version. Returns the chunk count.
    ///
    /// Nothing is touched until every chunk is embedded, so a failed re-index
    /// leaves the previous version searchable.
    pub async fn add_document(&self, document: Document) -> Result<usize, TornadoError> {
        let chunks = self.chunker.chunk(&document.content);
        let texts: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(TornadoError::provider(
                self.embedder.name(),
                format!("embedded {} of {} chunks", vectors.len(), chunks.len()),
            ));
        }

        self.remove_chunks(&document.id).await?;
        for (index, (text, vector)) in chunks.iter().zip(vectors).enumerate() {
            let record = VectorRecord::new(chunk_id(&document.id, index), vector)
                .with_metadata(DOCUMENT_ID, document.id.clone())
                .with_metadata(CHUNK_INDEX, index)
                .with_metadata(CHUNK_TEXT, text.clone());
            self.database.upsert(record).await?;
        }
        tracing::debug!(document_id = %document.id, chunks = chunks.len(), "indexed document");
        self.documents.put(document).await?;
        Ok(chunks.len())
    }

    /// Removes a document and its chunks. Returns `false` if it was unknown.
    pub async fn remove_document(&self, id: &str) -> Result<bool, TornadoError> {
        self.remove_chunks(id).await?;
        self.documents.delete(id).await
    }

    pub async fn document(&self, id: &str) -> Result<Option<Document>, TornadoError> {
        self.documents.get(id).await
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, TornadoError> {
        self.retrieve_filtered(query, top_k, None).await
    }

    /// Like [`retrieve`](Self::retrieve), restricted to chunks of one document.
    pub async fn retrieve_from(
        &self,
        document_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, TornadoError> {
        let filter = MetadataFilter::from([(DOCUMENT_ID.to_string(), Value::from(document_id))]);
        self.retrieve_filtered(query, top_k, Some(&filter)).await
    }

    async fn retrieve_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>, TornadoError> {
        if query.trim().is_empty() || top_k == 0 || self.database.count().await? == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        let matches = self.database.query(&vector, top_k, filter).await?;
        Ok(matches
            .into_iter()
            .filter_map(|hit| {
                Some(RetrievedChunk {
                    document_id: hit.metadata.get(DOCUMENT_ID)?.as_str()?.to_string(),
                    chunk_index: hit.metadata.get(CHUNK_INDEX)?.as_u64()? as usize,
                    text: hit.metadata.get(CHUNK_TEXT)?.as_str()?.to_string(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Chunking is deterministic, so re-chunking the stored text yields the
    /// ids written at index time.
    async fn remove_chunks(&self, id: &str) -> Result<(), TornadoError> {
        let Some(existing) = self.documents.get(id).await? else {
            return Ok(());
        };
        let count = self.chunker.chunk(&existing.content).len();
        for index in 0..count {
            self.database.delete(&chunk_id(id, index)).await?;
        }
        Ok(())
    }
}

fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}#{index}")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::vector::{InMemoryDocumentStore, InMemoryVectorDatabase};

    /// Counts a fixed vocabulary, so texts sharing words score higher.
    struct KeywordEmbedder;

    const VOCABULARY: [&str; 4] = ["rust", "python", "borrow", "garden"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, TornadoError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCABULARY
                        .iter()
                        .map(|word| lower.matches(word).count() as f32 + 0.01)
                        .collect()
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            VOCABULARY.len()
        }

        fn name(&self) -> &'static str {
            "keyword"
        }
    }

    fn retriever() -> (Retriever, Arc<InMemoryVectorDatabase>) {
        let database = Arc::new(InMemoryVectorDatabase::new());
        let retriever = Retriever::new(
            TextChunker::new(40, 0).unwrap(),
            Arc::new(KeywordEmbedder),
            database.clone(),
            Arc::new(InMemoryDocumentStore::new()),
        );
        (retriever, database)
    }

    #[tokio::test]
    async fn retrieves_most_relevant_chunk() {
        let (retriever, _) = retriever();
        let chunks = retriever
            .add_document(Document::new(
                "notes",
                "Rust has a borrow checker.\nPython has a GIL.\nTomatoes grow in the garden.",
            ))
            .await
            .unwrap();
        assert_eq!(chunks, 3);

        let hits = retriever.retrieve("how does rust borrow?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "notes");
        assert_eq!(hits[0].chunk_index, 0);
        assert_eq!(hits[0].text, "Rust has a borrow checker.");
    }

    #[tokio::test]
    async fn re_adding_replaces_old_chunks() {
        let (retriever, database) = retriever();
        retriever
            .add_document(Document::new("d", "rust one\n".repeat(10)))
            .await
            .unwrap();
        let before = database.count().await.unwrap();
        retriever
            .add_document(Document::new("d", "garden"))
            .await
            .unwrap();
        assert!(before > 1);
        assert_eq!(database.count().await.unwrap(), 1);

        assert!(retriever.remove_document("d").await.unwrap());
        assert_eq!(database.count().await.unwrap(), 0);
        assert!(!retriever.remove_document("d").await.unwrap());
    }

    /// Embeds like [`KeywordEmbedder`] until `healthy_calls` batches are used up.
    struct FlakyEmbedder {
        healthy_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, TornadoError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
                return Err(TornadoError::provider("flaky", "embedding backend unavailable"));
            }
            KeywordEmbedder.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            VOCABULARY.len()
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn failed_re_add_keeps_previous_version_searchable() {
        let database = Arc::new(InMemoryVectorDatabase::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let retriever = Retriever::new(
            TextChunker::new(40, 0).unwrap(),
            Arc::new(FlakyEmbedder {
                healthy_calls: 1,
                calls: AtomicUsize::new(0),
            }),
            database.clone(),
            documents.clone(),
        );
        retriever
            .add_document(Document::new("d", "rust borrow
garden beds"))
            .await
            .unwrap();
        let indexed = database.count().await.unwrap();
        assert_eq!(indexed, 1);

        let err = retriever
            .add_document(Document::new("d", "python only"))
            .await
            .unwrap_err();
        assert!(matches!(err, TornadoError::Provider { provider: "flaky", .. }));
        assert_eq!(database.count().await.unwrap(), indexed);
        let stored = documents.get("d").await.unwrap().expect("document kept");
        assert_eq!(stored.content, "rust borrow\ngarden beds");
    }

    #[tokio::test]
    async fn retrieve_from_limits_to_one_document() {
        let (retriever, _) = retriever();
        retriever
            .add_document(Document::new("a", "rust rust rust"))
            .await
            .unwrap();
        retriever
            .add_document(Document::new("b", "rust and python"))
            .await
            .unwrap();
        let hits = retriever.retrieve_from("b", "rust", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "b");
        assert!(retriever.retrieve("   ", 5).await.unwrap().is_empty());
    }
}
