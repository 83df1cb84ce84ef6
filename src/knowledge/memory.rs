//! In-memory Vector Index
//!
//! 서버 없이 동작하는 brute-force 인덱스입니다. 테스트와 소규모 코퍼스용.
//! 저장된 벡터가 정규화되어 있다는 전제로 내적을 유사도로 사용합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};

use super::vector::{dot_product, Distance, IndexPoint, ScoredPoint, VectorIndex};

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: HashMap<String, IndexPoint>,
}

/// 메모리 기반 벡터 인덱스
///
/// 컬렉션 이름 -> (포인트 ID -> 포인트)
#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn recreate_collection(&self, name: &str, dimension: usize, _metric: Distance) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| {
            RagError::index("upsert", format!("collection '{}' does not exist", collection))
        })?;

        // 하나라도 차원이 맞지 않으면 전체 거부
        if let Some(bad) = points.iter().find(|p| p.vector.len() != store.dimension) {
            return Err(RagError::index(
                "upsert",
                format!(
                    "point {} has dimension {}, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    store.dimension
                ),
            ));
        }

        for point in points {
            store.points.insert(point.id.clone(), point.clone());
        }
        Ok(points.len())
    }

    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::query(collection, "collection does not exist"))?;

        let mut scored: Vec<ScoredPoint> = store
            .points
            .values()
            .map(|point| ScoredPoint {
                score: dot_product(&point.vector, vector),
                payload: serde_json::to_value(&point.payload)
                    .ok()
                    .and_then(|v| match v {
                        Value::Object(map) => Some(map),
                        _ => None,
                    }),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| RagError::index("count", format!("collection '{}' does not exist", collection)))
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| {
            RagError::index("delete_points", format!("collection '{}' does not exist", collection))
        })?;
        for id in ids {
            store.points.remove(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================
