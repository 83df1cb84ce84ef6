//! Index Writer - 컬렉션 재생성 및 엔트리 upsert
//!
//! 엔트리 ID는 호출자가 아니라 writer가 생성합니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

use super::vector::{ChunkPayload, Distance, IndexPoint, VectorIndex};

// ============================================================================
// Id Strategy
// ============================================================================

/// 엔트리 ID 생성 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// 매 기록마다 새 UUID v4 (재수집 시 컬렉션을 비우지 않으면 중복)
    Random,
    /// source + chunk_index 해시 (재수집 시 덮어쓰기)
    Deterministic,
}

impl IdStrategy {
    pub fn id_for(&self, payload: &ChunkPayload) -> String {
        match self {
            IdStrategy::Random => Uuid::new_v4().to_string(),
            IdStrategy::Deterministic => deterministic_id(&payload.source, payload.chunk_index),
        }
    }
}

impl FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(IdStrategy::Random),
            "deterministic" => Ok(IdStrategy::Deterministic),
            other => Err(format!(
                "unknown id strategy '{}' (expected 'random' or 'deterministic')",
                other
            )),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdStrategy::Random => write!(f, "random"),
            IdStrategy::Deterministic => write!(f, "deterministic"),
        }
    }
}

/// SHA-256(source, chunk_index) 앞 16 바이트로 UUID 생성
fn deterministic_id(source: &str, chunk_index: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_index.to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

// ============================================================================
// IndexEntry
// ============================================================================

/// 기록 대기 중인 엔트리 (ID는 writer가 부여)
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// 정규화된 임베딩 벡터
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

// ============================================================================
// IndexWriter
// ============================================================================

/// 인덱스 writer
pub struct IndexWriter {
    index: Arc<dyn VectorIndex>,
    collection: String,
    dimension: usize,
    id_strategy: IdStrategy,
    max_batch: usize,
}

impl IndexWriter {
    /// # Arguments
    /// * `index` - 벡터 인덱스 백엔드
    /// * `collection` - 대상 컬렉션 이름
    /// * `dimension` - 벡터 차원
    pub fn new(index: Arc<dyn VectorIndex>, collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            index,
            collection: collection.into(),
            dimension,
            id_strategy: IdStrategy::Random,
            max_batch: 256,
        }
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    /// upsert 요청 당 최대 포인트 수
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// 컬렉션 삭제 후 빈 컬렉션 생성 (cosine)
    ///
    /// 같은 컬렉션에 대한 검색 트래픽과 동시에 호출하면 안 됩니다.
    pub async fn recreate_collection(&self) -> Result<()> {
        self.index
            .recreate_collection(&self.collection, self.dimension, Distance::Cosine)
            .await
    }

    /// 엔트리 기록
    ///
    /// 각 엔트리에 새 ID를 부여한 뒤 `max_batch` 단위로 전송합니다.
    /// 반환 시점에 모든 엔트리가 기록되어 있습니다. 하나라도 실패하면 이번 호출에서
    /// 보낸 포인트를 모두 삭제한 뒤 에러를 반환하므로 일부만 조회되는 상태는 남지 않습니다.
    /// (Deterministic ID로 덮어쓴 기존 포인트는 복구되지 않음)
    pub async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            tracing::debug!(collection = %self.collection, "Nothing to upsert");
            return Ok(0);
        }

        let points: Vec<IndexPoint> = entries
            .into_iter()
            .map(|entry| IndexPoint {
                id: self.id_strategy.id_for(&entry.payload),
                vector: entry.vector,
                payload: entry.payload,
            })
            .collect();

        let mut written = 0;
        for (i, batch) in points.chunks(self.max_batch).enumerate() {
            match self.index.upsert(&self.collection, batch).await {
                Ok(count) => written += count,
                Err(e) => {
                    // 실패한 배치도 일부 반영되었을 수 있으므로 함께 삭제
                    let sent = ((i + 1) * self.max_batch).min(points.len());
                    self.rollback(&points[..sent]).await;
                    return Err(e);
                }
            }
        }

        tracing::info!(
            collection = %self.collection,
            count = written,
            backend = self.index.name(),
            "Upserted entries"
        );
        Ok(written)
    }

    /// 부분 기록된 포인트 삭제 (실패는 로그만 남김)
    async fn rollback(&self, points: &[IndexPoint]) {
        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        for batch in ids.chunks(self.max_batch) {
            if let Err(e) = self.index.delete_points(&self.collection, batch).await {
                tracing::error!(
                    collection = %self.collection,
                    error = %e,
                    "Rollback after failed upsert did not complete"
                );
                return;
            }
        }
        tracing::warn!(
            collection = %self.collection,
            count = ids.len(),
            "Rolled back partially written entries"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
