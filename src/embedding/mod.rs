//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 문서 임베딩(배치, RETRIEVAL_DOCUMENT)과 쿼리 임베딩(단건, RETRIEVAL_QUERY)을
//! 제공하는 프로바이더 경계입니다. 재시도는 하지 않습니다 (호출자 정책).
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_config(&config)?;
//! let vectors = embedder.embed_documents(&chunks).await?;
//! let query = embedder.embed_query("when is the deadline").await?;
//! ```

mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

use rate_limit::RateLimiter;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 태스크 힌트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    /// 코퍼스 인덱싱용
    RetrievalDocument,
    /// 비대칭 검색의 쿼리용
    RetrievalQuery,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// 임베딩 프로바이더 트레이트
///
/// 두 연산 모두 고정 차원의 벡터를 입력 순서대로 정확히 하나씩 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서 배치 임베딩 (RETRIEVAL_DOCUMENT)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 단일 쿼리 임베딩 (RETRIEVAL_QUERY)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 배치 응답 검증 - 개수와 차원이 요청과 일치해야 함
pub fn validate_batch(
    requested: usize,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != requested {
        return Err(RagError::embedding(
            "embed_documents",
            format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                requested
            ),
        ));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(RagError::embedding(
            "embed_documents",
            format!(
                "vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dimension
            ),
        ));
    }
    Ok(vectors)
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini API 기본 엔드포인트
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// gemini-embedding-001 최대 출력 차원 (MRL)
const MAX_DIMENSION: usize = 3072;

/// batchEmbedContents 요청 당 최대 입력 수
pub const MAX_BATCH_SIZE: usize = 100;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
    base_url: String,
    rate_limiter: Option<Arc<Mutex<RateLimiter>>>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 ID (예: `gemini-embedding-001`)
    /// * `dimension` - 출력 차원 (1 ~ 3072)
    /// * `timeout` - 요청 타임아웃
    pub fn new(api_key: String, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(RagError::Config(format!(
                "Invalid dimension: {}. Must be between 1 and {}",
                dimension, MAX_DIMENSION
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model: model.trim_start_matches("models/").to_string(),
            dimension,
            base_url: GEMINI_BASE_URL.to_string(),
            rate_limiter: None,
        })
    }

    /// 설정과 환경변수의 API 키로 생성
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(
            api_key,
            &config.embed_model,
            config.dimension,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// 엔드포인트 변경 (프록시/게이트웨이용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 분당 요청 수 제한 적용 (무료 티어 등)
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limiter = Some(Arc::new(Mutex::new(RateLimiter::per_minute(
            requests_per_minute,
        ))));
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn request_for(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.as_str(),
            output_dimensionality: Some(self.dimension),
        }
    }

    /// POST 후 성공 응답 본문 반환
    async fn post<T: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        url: &str,
        body: &T,
    ) -> Result<String> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.lock().await.acquire().await;
        }

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("failed to send request: {}", e)
                };
                tracing::error!(provider = "gemini", operation, error = %message, "embedding request failed");
                RagError::embedding(operation, message)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::embedding(operation, format!("failed to read response body: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = if status.as_u16() == 429 {
            "rate limit exceeded (429)".to_string()
        } else if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
            format!(
                "Gemini API error ({} {}): {}",
                status.as_u16(),
                error.error.status,
                error.error.message
            )
        } else {
            format!("Gemini API error ({}): {}", status, body)
        };
        tracing::error!(provider = "gemini", operation, %status, "embedding request rejected");
        Err(RagError::embedding(operation, message))
    }
}

/// Gemini API 요청 본문
/// ref: https://ai.google.dev/api/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// embedContent 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

/// batchEmbedContents 응답
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// batchEmbedContents 응답 디코딩 + 개수/차원 검증
fn decode_batch_response(body: &str, requested: usize, dimension: usize) -> Result<Vec<Vec<f32>>> {
    let response: BatchEmbedResponse = serde_json::from_str(body).map_err(|e| {
        RagError::embedding("embed_documents", format!("malformed response: {}", e))
    })?;
    let vectors = response.embeddings.into_iter().map(|e| e.values).collect();
    validate_batch(requested, vectors, dimension)
}

/// embedContent 응답 디코딩 + 차원 검증
fn decode_query_response(body: &str, dimension: usize) -> Result<Vec<f32>> {
    let response: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| RagError::embedding("embed_query", format!("malformed response: {}", e)))?;
    let values = response.embedding.values;
    if values.len() != dimension {
        return Err(RagError::embedding(
            "embed_query",
            format!("vector has dimension {}, expected {}", values.len(), dimension),
        ));
    }
    Ok(values)
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::Validation("embedding batch is empty".into()));
        }
        if texts.len() > MAX_BATCH_SIZE {
            return Err(RagError::Validation(format!(
                "embedding batch of {} exceeds provider limit {}",
                texts.len(),
                MAX_BATCH_SIZE
            )));
        }

        tracing::debug!(provider = "gemini", batch_size = texts.len(), "embedding document batch");

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.request_for(t, TaskType::RetrievalDocument))
                .collect(),
        };

        let body = self
            .post("embed_documents", &self.endpoint("batchEmbedContents"), &request)
            .await?;
        decode_batch_response(&body, texts.len(), self.dimension)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        tracing::debug!(provider = "gemini", text_len = text.len(), "embedding query");

        let request = self.request_for(text, TaskType::RetrievalQuery);
        let body = self
            .post("embed_query", &self.endpoint("embedContent"), &request)
            .await?;
        decode_query_response(&body, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY`
/// 2. `GOOGLE_API_KEY`
/// 3. `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String> {
    api_key_from(|var| std::env::var(var).ok()).ok_or_else(|| {
        RagError::Config(
            "API key not found. Set GEMINI_API_KEY or GOOGLE_API_KEY environment variable.\n\
             Get your API key at: https://aistudio.google.com/app/apikey"
                .into(),
        )
    })
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    api_key_from(|var| std::env::var(var).ok()).is_some()
}

/// 우선순위에 따라 첫 번째 비어있지 않은 키 선택
fn api_key_from<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_VARS.iter().find_map(|var| {
        let key = lookup(var).filter(|k| !k.is_empty())?;
        tracing::debug!("Using API key from {}", var);
        Some(key)
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimension: usize) -> GeminiEmbedding {
        GeminiEmbedding::new(
            "fake_key".to_string(),
            "gemini-embedding-001",
            dimension,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        for dim in [0, 4096] {
            let result =
                GeminiEmbedding::new("k".into(), "gemini-embedding-001", dim, Duration::from_secs(1));
            let err = result.err().map(|e| e.to_string()).unwrap_or_default();
            assert!(err.contains("Invalid dimension"));
        }
    }

    #[test]
    fn test_endpoint_and_model_prefix() {
        let e = GeminiEmbedding::new(
            "k".into(),
            "models/gemini-embedding-001",
            768,
            Duration::from_secs(1),
        )
        .unwrap()
        .with_base_url("http://localhost:8080/v1beta/");

        assert_eq!(
            e.endpoint("batchEmbedContents"),
            "http://localhost:8080/v1beta/models/gemini-embedding-001:batchEmbedContents"
        );
        assert_eq!(e.name(), "gemini-embedding-001");
    }

    #[test]
    fn test_request_serialization() {
        let e = embedder(768);
        let request = BatchEmbedRequest {
            requests: vec![e.request_for("hello", TaskType::RetrievalDocument)],
        };
        let json = serde_json::to_value(&request).unwrap();

        let first = &json["requests"][0];
        assert_eq!(first["model"], "models/gemini-embedding-001");
        assert_eq!(first["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(first["outputDimensionality"], 768);
        assert_eq!(first["content"]["parts"][0]["text"], "hello");

        let query = serde_json::to_value(e.request_for("q", TaskType::RetrievalQuery)).unwrap();
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_decode_batch_response() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2,0.3]},{"values":[0.4,0.5,0.6]}]}"#;
        let vectors = decode_batch_response(body, 2, 3).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_decode_batch_count_mismatch() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2,0.3]}]}"#;
        let err = decode_batch_response(body, 2, 3).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingProvider { .. }));
        assert!(err.to_string().contains("1 vectors for 2 inputs"));
    }

    #[test]
    fn test_decode_batch_dimension_mismatch() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]}]}"#;
        let err = decode_batch_response(body, 1, 3).unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode_batch_response("<html>", 1, 3).is_err());
        assert!(decode_query_response(r#"{"embedding":{}}"#, 3).is_err());
    }

    #[test]
    fn test_decode_query_response() {
        let body = r#"{"embedding":{"values":[1.0,0.0,0.0]}}"#;
        assert_eq!(decode_query_response(body, 3).unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_batch_rejected() {
        let e = embedder(768);
        let err = e.embed_documents(&[]).await.unwrap_err();
        assert!(err.is_validation());

        let texts = vec!["x".to_string(); MAX_BATCH_SIZE + 1];
        let err = e.embed_documents(&texts).await.unwrap_err();
        assert!(err.is_validation());
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| {
            pairs
                .iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_api_key_precedence() {
        assert_eq!(
            api_key_from(env(&[("GOOGLE_API_KEY", "google"), ("GEMINI_API_KEY", "gemini")])),
            Some("gemini".to_string())
        );
        // 빈 값은 건너뜀
        assert_eq!(
            api_key_from(env(&[("GEMINI_API_KEY", ""), ("GOOGLE_AI_API_KEY", "ai")])),
            Some("ai".to_string())
        );
        assert_eq!(api_key_from(env(&[("OPENAI_API_KEY", "x")])), None);
    }
}
