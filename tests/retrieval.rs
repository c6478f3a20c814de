mod common;

use std::sync::Arc;

use serde_json::json;
use tornado_llm::vector::{
    Document, DocumentStore, Embedder, FileDocumentStore, InMemoryVectorDatabase, OpenAiEmbedder,
    Retriever, TextChunker, VectorDatabase,
};

use common::{Reply, ScriptedTransport, init_tracing};

const GUIDE: &str = "Ownership moves values between bindings.\nBorrowing lends access without moving.";

#[tokio::test]
async fn retriever_indexes_persists_and_answers() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");

    let transport = ScriptedTransport::new(vec![
        Reply::json(
            200,
            json!({"object": "list", "data": [
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0, 0.0]},
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0, 0.0]}
            ]}),
        ),
        Reply::json(
            200,
            json!({"object": "list", "data": [
                {"object": "embedding", "index": 0, "embedding": [0.1, 0.9, 0.0]}
            ]}),
        ),
    ]);
    let embedder = OpenAiEmbedder::new(transport.clone(), "sk-mock")
        .with_base_url("http://mock.openai")
        .with_dimensions(3);
    assert_eq!(embedder.dimensions(), 3);

    let documents = Arc::new(
        FileDocumentStore::open(dir.path().join("documents"))
            .await
            .expect("document store"),
    );
    let database = Arc::new(InMemoryVectorDatabase::with_dimensions(3));
    let retriever = Retriever::new(
        TextChunker::new(45, 0).expect("chunker"),
        Arc::new(embedder),
        database.clone(),
        documents.clone(),
    );

    let chunks = retriever
        .add_document(Document::new("rust/ownership", GUIDE).with_metadata("lang", "en"))
        .await
        .expect("indexing");
    assert_eq!(chunks, 2);

    let hits = retriever
        .retrieve("How does borrowing work?", 1)
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "rust/ownership");
    assert_eq!(hits[0].chunk_index, 1);
    assert_eq!(hits[0].text, "Borrowing lends access without moving.");
    assert!(hits[0].score > 0.9);

    let embed_request = transport.request_body(0);
    assert_eq!(embed_request["model"], json!("text-embedding-3-small"));
    assert_eq!(embed_request["input"].as_array().map(Vec::len), Some(2));
    assert_eq!(transport.requests()[0].url, "http://mock.openai/v1/embeddings");

    let snapshot = dir.path().join("vectors.json");
    database.save_to(&snapshot).await.expect("save");
    let reloaded = InMemoryVectorDatabase::load_from(&snapshot)
        .await
        .expect("load");
    assert_eq!(reloaded.count().await.expect("count"), 2);
    let top = reloaded.query(&[1.0, 0.0, 0.0], 1, None).await.expect("query");
    assert_eq!(top[0].metadata["chunk_index"], json!(0));

    let reopened = FileDocumentStore::open(dir.path().join("documents"))
        .await
        .expect("reopen");
    let stored = reopened
        .get("rust/ownership")
        .await
        .expect("read")
        .expect("document persisted");
    assert_eq!(stored.content, GUIDE);
    assert_eq!(stored.metadata["lang"], json!("en"));
}

#[tokio::test]
async fn empty_documents_index_nothing() {
    let transport = ScriptedTransport::new(Vec::new());
    let retriever = Retriever::new(
        TextChunker::new(100, 1).expect("chunker"),
        Arc::new(OpenAiEmbedder::new(transport.clone(), "sk-mock")),
        Arc::new(InMemoryVectorDatabase::new()),
        Arc::new(tornado_llm::vector::InMemoryDocumentStore::new()),
    );

    assert_eq!(retriever.add_document(Document::new("blank", "  \n ")).await.expect("index"), 0);
    assert!(retriever.retrieve("anything", 3).await.expect("retrieve").is_empty());
    assert!(retriever.document("blank").await.expect("get").is_some());
    assert!(transport.requests().is_empty());
}
