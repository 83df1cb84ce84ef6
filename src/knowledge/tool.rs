//! 에이전트 도구 - `rag_search`
//!
//! 검색 결과를 `{"status": "ok", "results": [...]}` 형태로 반환합니다.
//! 프로바이더/인덱스 에러는 원문 대신 "no grounded context available" 로 낮춰 전달하고
//! 로그에만 남깁니다.

use serde::Serialize;

use super::search::{validate_limit, SearchEngine};
use super::vector::SearchResult;

/// 검색 실패 시 사용자에게 보여줄 메시지
pub const NO_GROUNDING: &str = "no grounded context available";

/// 도구 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResponse {
    Ok { results: Vec<SearchResult> },
    Error { message: String },
}

impl ToolResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResponse::Ok { .. })
    }
}

/// 입학 문서 벡터 검색
///
/// 답변 근거가 되도록 출처가 포함된 상위 청크를 반환합니다.
pub async fn rag_search(engine: &SearchEngine, query: &str, limit: i64) -> ToolResponse {
    let k = match validate_limit(limit) {
        Ok(k) => k,
        Err(e) => return ToolResponse::Error { message: e.to_string() },
    };

    match engine.search(query, k).await {
        Ok(results) => ToolResponse::Ok { results },
        Err(e) if e.is_validation() => ToolResponse::Error {
            message: e.to_string(),
        },
        Err(e) => {
            tracing::warn!(collection = engine.collection(), error = %e, "rag_search failed");
            ToolResponse::Error {
                message: NO_GROUNDING.to_string(),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::embedding::EmbeddingProvider;
    use crate::error::{RagError, Result};
    use crate::knowledge::memory::MemoryIndex;

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::embedding("embed_documents", "503 Service Unavailable"))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::embedding("embed_query", "503 Service Unavailable"))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(Arc::new(DownEmbedder), Arc::new(MemoryIndex::new()), "c")
    }

    #[tokio::test]
    async fn test_provider_error_degrades() {
        let response = rag_search(&engine(), "when is the deadline", 4).await;
        assert_eq!(
            response,
            ToolResponse::Error {
                message: NO_GROUNDING.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_validation_errors_surface() {
        let response = rag_search(&engine(), "  ", 4).await;
        match response {
            ToolResponse::Error { message } => assert!(message.contains("query is required")),
            other => panic!("unexpected response: {:?}", other),
        }

        let response = rag_search(&engine(), "deadline", -1).await;
        assert!(!response.is_ok());
    }

    #[test]
    fn test_serialization() {
        let ok = ToolResponse::Ok {
            results: vec![SearchResult {
                score: 0.5,
                source: Some("a.md".into()),
                chunk_index: Some(0),
                text: None,
            }],
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "status": "ok",
                "results": [{"score": 0.5, "source": "a.md", "chunk_index": 0, "text": null}]
            })
        );

        let err = ToolResponse::Error {
            message: NO_GROUNDING.into(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "message": NO_GROUNDING})
        );
    }
}
