//! 에러 타입
//!
//! 파이프라인 전 구간에서 공통으로 사용하는 에러 분류입니다.
//! 각 에러는 작업 이름과 원인을 함께 담아 그대로 로그에 남길 수 있습니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 호출자가 고칠 수 있는 입력 오류 (I/O 시도 전에 반환)
    #[error("Validation error: {0}")]
    Validation(String),

    /// 임베딩 프로바이더 실패 (타임아웃, 에러 응답, 개수/차원 불일치)
    #[error("Embedding provider error ({operation}): {message}")]
    EmbeddingProvider {
        operation: &'static str,
        message: String,
    },

    /// 벡터 인덱스 서비스 실패 (연결, 컬렉션 생성/삭제, upsert)
    #[error("Index service error ({operation}): {message}")]
    IndexService {
        operation: &'static str,
        message: String,
    },

    /// top-k 쿼리 실패
    #[error("Index query error on collection '{collection}': {message}")]
    IndexQuery { collection: String, message: String },

    /// 코퍼스 파일 I/O 실패
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 수집 실행 중 발생한 첫 번째 치명적 에러
    #[error("Ingestion aborted during {stage}: {source}")]
    IngestionAbort {
        stage: String,
        #[source]
        source: Box<RagError>,
    },

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn embedding(operation: &'static str, message: impl Into<String>) -> Self {
        Self::EmbeddingProvider {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn index(operation: &'static str, message: impl Into<String>) -> Self {
        Self::IndexService {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn query(collection: &str, message: impl Into<String>) -> Self {
        Self::IndexQuery {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// 수집 실행 중단 에러로 감싸기
    pub(crate) fn abort(self, stage: impl Into<String>) -> Self {
        match self {
            // 이미 감싸진 에러는 다시 감싸지 않음
            abort @ Self::IngestionAbort { .. } => abort,
            other => Self::IngestionAbort {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// 사용자 입력 오류 여부
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// 파이프라인 공통 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Tests
// ============================================================================
