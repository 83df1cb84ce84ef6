//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스에 저장/조회되는 모든 벡터는 L2 정규화되어 있어야 합니다.
//! 정규화된 벡터에서는 내적(dot product)이 곧 코사인 유사도입니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 유사도 측정 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
}

/// 인덱스 엔트리 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// 원본 파일 이름
    pub source: String,
    /// 문서 내 청크 순서 (0-based)
    pub chunk_index: u64,
    /// 청크 텍스트
    pub text: String,
}

/// 인덱스에 기록되는 포인트 (id + 정규화 벡터 + 페이로드)
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// 인덱스 쿼리 결과 (원시 페이로드 포함)
#[derive(Debug, Clone, Default)]
pub struct ScoredPoint {
    pub score: f32,
    pub payload: Option<Map<String, Value>>,
}

/// 검색 결과
///
/// 페이로드에 필드가 없으면 `None` 으로 남깁니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// 유사도 스코어
    pub score: f32,
    pub source: Option<String>,
    pub chunk_index: Option<u64>,
    pub text: Option<String>,
}

impl From<ScoredPoint> for SearchResult {
    fn from(point: ScoredPoint) -> Self {
        let payload = point.payload.unwrap_or_default();
        Self {
            score: point.score,
            source: payload.get("source").and_then(Value::as_str).map(str::to_string),
            chunk_index: payload.get("chunk_index").and_then(Value::as_u64),
            text: payload.get("text").and_then(Value::as_str).map(str::to_string),
        }
    }
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 벡터 인덱스 서비스 경계의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 컬렉션 삭제 후 빈 컬렉션으로 재생성 (파괴적)
    async fn recreate_collection(&self, name: &str, dimension: usize, metric: Distance) -> Result<()>;

    /// 포인트 기록. 반환 시점에 모든 포인트가 조회 가능해야 함
    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<usize>;

    /// top-k 유사도 검색 (스코어 내림차순)
    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;

    /// 포인트 개수 조회
    async fn count(&self, collection: &str) -> Result<usize>;

    /// ID로 포인트 삭제 (없는 ID는 무시)
    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// L2 정규화
///
/// 노름이 정확히 0 이면 입력을 그대로 반환합니다 (0 벡터는 0 벡터로 남음).
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// 유클리드 노름
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 내적 (정규화된 벡터에서는 코사인 유사도)
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Tests
// ============================================================================
