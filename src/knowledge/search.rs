//! Search Engine - 쿼리 임베딩 + top-k 벡터 검색
//!
//! 결과는 인덱스가 반환한 순서(스코어 내림차순) 그대로 전달하며 재정렬하지 않습니다.
//! 실패 시 재시도하지 않습니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::vector::{normalize, SearchResult, VectorIndex};

/// 검색 결과 수 검증 (`k >= 1`)
pub fn validate_limit(k: i64) -> Result<usize> {
    if k < 1 {
        return Err(RagError::Validation(format!("k must be at least 1, got {}", k)));
    }
    usize::try_from(k).map_err(|_| RagError::Validation(format!("k is too large: {}", k)))
}

/// 벡터 검색기
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection: String,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// 시맨틱 검색
    ///
    /// # Arguments
    /// * `query` - 검색 쿼리 (빈 문자열이면 네트워크 호출 전에 Validation 에러)
    /// * `k` - 최대 결과 수 (1 이상)
    ///
    /// # Returns
    /// 스코어 내림차순 검색 결과 (최대 k 건)
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Validation("query is required".into()));
        }
        if k == 0 {
            return Err(RagError::Validation("k must be at least 1, got 0".into()));
        }

        let raw = self.embedder.embed_query(query).await?;
        let vector = normalize(&raw);

        let hits = self.index.query(&self.collection, &vector, k).await?;

        let mut results: Vec<SearchResult> = hits.into_iter().map(SearchResult::from).collect();
        // 인덱스가 k 보다 많이 돌려줘도 계약은 최대 k 건
        results.truncate(k);

        tracing::debug!(
            collection = %self.collection,
            k,
            hits = results.len(),
            "Vector search finished"
        );
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
