//! Local retrieval building blocks: chunking, embedding, document storage
//! and brute-force vector search.

mod chunker;
mod database;
mod embeddings;
mod retriever;
mod store;

pub use chunker::TextChunker;
pub use database::{
    InMemoryVectorDatabase, MetadataFilter, QueryMatch, VectorDatabase, VectorRecord,
    cosine_similarity,
};
pub use embeddings::{Embedder, OpenAiEmbedder, SharedEmbedder};
pub use retriever::{RetrievedChunk, Retriever};
pub use store::{Document, DocumentStore, FileDocumentStore, InMemoryDocumentStore};
