use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::TornadoError;

/// A vector plus the metadata returned with query matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
    pub metadata: HashMap<String, Value>,
}

/// Every key must be present in a record's metadata with an equal value.
pub type MetadataFilter = HashMap<String, Value>;

#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Inserts or replaces the record with the same id.
    async fn upsert(&self, record: VectorRecord) -> Result<(), TornadoError>;

    /// The `top_k` records most similar to `vector`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, TornadoError>;

    async fn delete(&self, id: &str) -> Result<bool, TornadoError>;

    async fn count(&self) -> Result<usize, TornadoError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    dimensions: Option<usize>,
    records: BTreeMap<String, VectorRecord>,
}

/// Brute-force cosine search over every stored vector.
///
/// The dimension is fixed by [`InMemoryVectorDatabase::with_dimensions`] or by
/// the first inserted record.
#[derive(Debug, Default)]
pub struct InMemoryVectorDatabase {
    inner: RwLock<Snapshot>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                dimensions: Some(dimensions),
                records: BTreeMap::new(),
            }),
        }
    }

    pub async fn dimensions(&self) -> Option<usize> {
        self.inner.read().await.dimensions
    }

    /// Writes every record to `path` as JSON.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), TornadoError> {
        let path = path.as_ref();
        let json = {
            let inner = self.inner.read().await;
            serde_json::to_vec(&*inner)
                .map_err(|err| TornadoError::storage(format!("serialize vectors: {err}")))?
        };
        tokio::fs::write(path, json).await.map_err(|err| {
            TornadoError::storage(format!("write {}: {err}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "saved vector database");
        Ok(())
    }

    /// Loads a database previously written by [`save_to`](Self::save_to).
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, TornadoError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            TornadoError::storage(format!("read {}: {err}", path.display()))
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|err| {
            TornadoError::storage(format!("parse {}: {err}", path.display()))
        })?;
        if let Some(dimensions) = snapshot.dimensions {
            if let Some(record) = snapshot
                .records
                .values()
                .find(|record| record.vector.len() != dimensions)
            {
                return Err(TornadoError::storage(format!(
                    "record {} in {} has {} dimensions, expected {dimensions}",
                    record.id,
                    path.display(),
                    record.vector.len()
                )));
            }
        }
        tracing::debug!(path = %path.display(), records = snapshot.records.len(), "loaded vector database");
        Ok(Self {
            inner: RwLock::new(snapshot),
        })
    }
}

fn check_dimensions(expected: Option<usize>, actual: usize) -> Result<(), TornadoError> {
    if actual == 0 {
        return Err(TornadoError::validation("vector must not be empty"));
    }
    match expected {
        Some(expected) if expected != actual => Err(TornadoError::validation(format!(
            "vector has {actual} dimensions, expected {expected}"
        ))),
        _ => Ok(()),
    }
}

fn matches_filter(metadata: &HashMap<String, Value>, filter: Option<&MetadataFilter>) -> bool {
    filter.is_none_or(|filter| {
        filter
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    })
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn upsert(&self, record: VectorRecord) -> Result<(), TornadoError> {
        let mut inner = self.inner.write().await;
        check_dimensions(inner.dimensions, record.vector.len())?;
        if inner.dimensions.is_none() {
            inner.dimensions = Some(record.vector.len());
        }
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, TornadoError> {
        let inner = self.inner.read().await;
        check_dimensions(inner.dimensions, vector.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut matches: Vec<QueryMatch> = inner
            .records
            .values()
            .filter(|record| matches_filter(&record.metadata, filter))
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: record.metadata.clone(),
            })
            .collect();
        // Ties keep id order since records iterate sorted.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<bool, TornadoError> {
        Ok(self.inner.write().await.records.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize, TornadoError> {
        Ok(self.inner.read().await.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> InMemoryVectorDatabase {
        let db = InMemoryVectorDatabase::new();
        db.upsert(VectorRecord::new("x", vec![1.0, 0.0]).with_metadata("lang", "en"))
            .await
            .unwrap();
        db.upsert(VectorRecord::new("y", vec![0.0, 1.0]).with_metadata("lang", "fr"))
            .await
            .unwrap();
        db.upsert(VectorRecord::new("xy", vec![1.0, 1.0]).with_metadata("lang", "en"))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn query_ranks_by_cosine() {
        let db = seeded().await;
        let hits = db.query(&[1.0, 0.1], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn filter_requires_equal_metadata() {
        let db = seeded().await;
        let filter = MetadataFilter::from([("lang".to_string(), json!("fr"))]);
        let hits = db.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "y");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let db = seeded().await;
        assert!(matches!(
            db.upsert(VectorRecord::new("z", vec![1.0, 2.0, 3.0])).await,
            Err(TornadoError::Validation { .. })
        ));
        assert!(db.query(&[1.0], 1, None).await.is_err());
        assert!(InMemoryVectorDatabase::with_dimensions(3)
            .upsert(VectorRecord::new("z", vec![1.0]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let db = seeded().await;
        db.upsert(VectorRecord::new("x", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(db.count().await.unwrap(), 3);
        assert!(db.delete("x").await.unwrap());
        assert!(!db.delete("x").await.unwrap());
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        let db = seeded().await;
        db.save_to(&path).await.unwrap();

        let loaded = InMemoryVectorDatabase::load_from(&path).await.unwrap();
        assert_eq!(loaded.count().await.unwrap(), 3);
        assert_eq!(loaded.dimensions().await, Some(2));
        let hits = loaded.query(&[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].id, "y");
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
