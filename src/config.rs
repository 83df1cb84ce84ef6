//! 설정 모듈
//!
//! 프로세스 시작 시 한 번 생성되어 각 컴포넌트에 참조로 전달됩니다.
//! 값은 환경변수(및 `.env` 파일)에서 읽고, 없으면 기본값을 사용합니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::embedding::MAX_BATCH_SIZE;
use crate::error::{RagError, Result};
use crate::knowledge::IdStrategy;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_COLLECTION: &str = "admissions_rag";
pub const DEFAULT_EMBED_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_DOCS_DIR: &str = "agents/kai_agent/rag_docs";
/// 에이전트 폴더의 환경 파일 (기존 환경변수보다 우선)
pub const AGENT_ENV_FILE: &str = "agents/kai_agent/.env";

/// 기본 임베딩 차원 (저장/성능 권장값)
pub const DEFAULT_DIMENSION: usize = 768;
/// 임베딩 요청 당 최대 청크 수
pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 120;
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 256;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// RagConfig
// ============================================================================

/// 파이프라인 설정
#[derive(Debug, Clone, Serialize)]
pub struct RagConfig {
    /// Qdrant REST 엔드포인트
    pub qdrant_url: String,
    #[serde(skip_serializing)]
    pub qdrant_api_key: Option<String>,
    /// 컬렉션 이름
    pub collection: String,
    /// 임베딩 모델 ID
    pub embed_model: String,
    /// 임베딩 차원 (컬렉션 수명 동안 고정)
    pub dimension: usize,
    /// 임베딩 배치 크기
    pub batch_size: usize,
    /// 파일 당 동시에 처리할 임베딩 배치 수
    pub embed_concurrency: usize,
    /// 실패한 임베딩 배치 재시도 횟수 (0 = 즉시 실패)
    pub embed_retries: u32,
    /// 임베딩 API 분당 요청 제한 (0 = 제한 없음)
    pub embed_rpm: u32,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// upsert 요청 당 최대 포인트 수
    pub upsert_batch_size: usize,
    /// 문서 디렉토리
    pub docs_dir: PathBuf,
    /// 기본 검색 결과 수
    pub top_k: usize,
    /// 엔트리 ID 생성 방식
    pub id_strategy: IdStrategy,
    /// 외부 서비스 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_concurrency: 1,
            embed_retries: 0,
            embed_rpm: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            docs_dir: PathBuf::from(DEFAULT_DOCS_DIR),
            top_k: DEFAULT_TOP_K,
            id_strategy: IdStrategy::Random,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    ///
    /// `agents/kai_agent/.env` 가 있으면 그 값으로 기존 환경변수를 덮어쓰고,
    /// 없으면 현재 디렉토리의 `.env` 를 (덮어쓰지 않고) 읽습니다.
    pub fn from_env() -> Result<Self> {
        load_env_file(Path::new(AGENT_ENV_FILE))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 생성
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("QDRANT_URL") {
            config.qdrant_url = v;
        }
        config.qdrant_api_key = get("QDRANT_API_KEY");
        if let Some(v) = get("QDRANT_COLLECTION") {
            config.collection = v;
        }
        if let Some(v) = get("EMBED_MODEL") {
            config.embed_model = v;
        }
        if let Some(v) = get("RAG_DOCS_DIR") {
            config.docs_dir = PathBuf::from(v);
        }

        parse_into(&get, "EMBED_DIMENSION", &mut config.dimension)?;
        parse_into(&get, "EMBED_BATCH_SIZE", &mut config.batch_size)?;
        parse_into(&get, "EMBED_CONCURRENCY", &mut config.embed_concurrency)?;
        parse_into(&get, "EMBED_RETRIES", &mut config.embed_retries)?;
        parse_into(&get, "EMBED_RPM", &mut config.embed_rpm)?;
        parse_into(&get, "CHUNK_SIZE", &mut config.chunk_size)?;
        parse_into(&get, "CHUNK_OVERLAP", &mut config.chunk_overlap)?;
        parse_into(&get, "UPSERT_BATCH_SIZE", &mut config.upsert_batch_size)?;
        parse_into(&get, "RAG_TOP_K", &mut config.top_k)?;
        parse_into(&get, "RAG_ID_STRATEGY", &mut config.id_strategy)?;
        parse_into(&get, "REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;

        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.qdrant_url)
            .map_err(|e| RagError::Config(format!("Invalid QDRANT_URL '{}': {}", self.qdrant_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RagError::Config(format!(
                "QDRANT_URL must be http(s), got '{}'",
                url.scheme()
            )));
        }

        if self.collection.trim().is_empty() {
            return Err(RagError::Config("collection name must not be empty".into()));
        }

        let positive = [
            ("EMBED_DIMENSION", self.dimension),
            ("EMBED_BATCH_SIZE", self.batch_size),
            ("EMBED_CONCURRENCY", self.embed_concurrency),
            ("CHUNK_SIZE", self.chunk_size),
            ("UPSERT_BATCH_SIZE", self.upsert_batch_size),
            ("RAG_TOP_K", self.top_k),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RagError::Config(format!("{} must be greater than zero", name)));
            }
        }

        // 재색인은 컬렉션을 먼저 비우므로 프로바이더가 거부할 배치는 여기서 막음
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(RagError::Config(format!(
                "EMBED_BATCH_SIZE must be at most {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.chunk_overlap >= self.chunk_size {
            tracing::warn!(
                chunk_size = self.chunk_size,
                chunk_overlap = self.chunk_overlap,
                "chunk_overlap >= chunk_size, chunker will advance one character at a time"
            );
        }

        Ok(())
    }
}

/// 환경 파일 로드. 지정한 파일이 있으면 override, 없으면 `.env` 탐색
fn load_env_file(agent_env: &Path) -> Result<()> {
    if agent_env.is_file() {
        dotenvy::from_path_override(agent_env).map_err(|e| {
            RagError::Config(format!("Failed to load {}: {}", agent_env.display(), e))
        })?;
        tracing::debug!("Loaded environment from {:?} (override)", agent_env);
    } else if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {:?}", path);
    }
    Ok(())
}

/// 환경변수 값을 파싱하여 필드에 대입 (없으면 기본값 유지)
fn parse_into<T, G>(get: &G, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("Invalid {}='{}': {}", key, raw, e)))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
