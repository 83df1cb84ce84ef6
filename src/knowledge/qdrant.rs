//! Qdrant Vector Index - REST API 백엔드
//!
//! 연결 시 서버 버전을 한 번 확인하여 쿼리 방식을 고정합니다.
//! - Qdrant >= 1.10: Query API (`/points/query`)
//! - 그 이전: Search API (`/points/search`)
//!
//! ref: https://api.qdrant.tech/api-reference

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::error::{RagError, Result};

use super::vector::{ChunkPayload, Distance, IndexPoint, ScoredPoint, VectorIndex};

/// Query API가 도입된 버전
const QUERY_API_SINCE: (u64, u64) = (1, 10);

// ============================================================================
// Query API Selection
// ============================================================================

/// 서버가 지원하는 top-k 쿼리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryApi {
    /// `POST /collections/{c}/points/query`
    Query,
    /// `POST /collections/{c}/points/search` (legacy)
    Search,
}

impl QueryApi {
    /// 서버 버전 문자열로 결정 (파싱 불가 시 Query API)
    pub fn from_version(version: &str) -> Self {
        let mut parts = version
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|p| p.split(|c: char| !c.is_ascii_digit()).next().unwrap_or(""));

        let major = parts.next().and_then(|p| p.parse::<u64>().ok());
        let minor = parts.next().and_then(|p| p.parse::<u64>().ok()).unwrap_or(0);

        match major {
            Some(major) if (major, minor) < QUERY_API_SINCE => QueryApi::Search,
            _ => QueryApi::Query,
        }
    }

    fn segments<'a>(&self, collection: &'a str) -> [&'a str; 4] {
        match self {
            QueryApi::Query => ["collections", collection, "points", "query"],
            QueryApi::Search => ["collections", collection, "points", "search"],
        }
    }

    fn body(&self, vector: &[f32], limit: usize) -> Value {
        match self {
            QueryApi::Query => json!({ "query": vector, "limit": limit, "with_payload": true }),
            QueryApi::Search => json!({ "vector": vector, "limit": limit, "with_payload": true }),
        }
    }

    /// 응답의 `result` 에서 포인트 목록 추출
    fn decode(&self, result: Value) -> std::result::Result<Vec<RawScoredPoint>, serde_json::Error> {
        match self {
            QueryApi::Query => serde_json::from_value::<QueryResult>(result).map(|r| r.points),
            QueryApi::Search => serde_json::from_value(result),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// 공통 응답 래퍼 `{"result": ..., "status": ..., "time": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    status: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<RawScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct RawScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Serialize)]
struct PointBody<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a ChunkPayload,
}

// ============================================================================
// QdrantIndex
// ============================================================================

/// Qdrant REST 벡터 인덱스
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    query_api: QueryApi,
}

impl QdrantIndex {
    /// 서버에 연결하고 쿼리 방식을 결정
    ///
    /// # Arguments
    /// * `url` - Qdrant REST 엔드포인트 (예: `http://localhost:6333`)
    /// * `api_key` - `api-key` 헤더 값 (선택)
    /// * `timeout` - 요청 타임아웃
    pub async fn connect(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut index = Self::with_query_api(url, api_key, timeout, QueryApi::Query)?;

        let info: ServerInfo = index.send(Method::GET, &[], None, "connect").await?;
        index.query_api = QueryApi::from_version(&info.version);

        tracing::info!(
            url = %index.base_url,
            version = %info.version,
            query_api = ?index.query_api,
            "Connected to Qdrant"
        );
        Ok(index)
    }

    /// 쿼리 방식을 직접 지정하여 생성 (버전 확인 생략)
    pub fn with_query_api(
        url: &str,
        api_key: Option<String>,
        timeout: Duration,
        query_api: QueryApi,
    ) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| RagError::Config(format!("Invalid Qdrant URL '{}': {}", url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RagError::Config(format!("Invalid Qdrant URL '{}'", url)));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            query_api,
        })
    }

    /// 선택된 쿼리 방식
    pub fn query_api(&self) -> QueryApi {
        self.query_api
    }

    /// 경로 세그먼트로 URL 생성 (세그먼트는 퍼센트 인코딩됨)
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if segments.is_empty() {
            return url;
        }
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// 요청 전송 후 응답 본문 반환 (상태 코드 포함)
    async fn send_raw(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> std::result::Result<(StatusCode, String), reqwest::Error> {
        let mut request = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// 요청 전송 후 `result` 디코딩. 실패는 `IndexService` 에러
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
        operation: &'static str,
    ) -> Result<T> {
        self.send_to(method, self.endpoint(segments), segments.is_empty(), body, operation)
            .await
    }

    async fn send_to<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        root: bool,
        body: Option<&Value>,
        operation: &'static str,
    ) -> Result<T> {
        let (status, text) = self
            .send_raw(method, url, body)
            .await
            .map_err(|e| RagError::index(operation, e.to_string()))?;

        if !status.is_success() {
            return Err(RagError::index(operation, error_message(status, &text)));
        }

        if root {
            // 루트(`GET /`)는 래퍼 없이 반환됨
            return serde_json::from_str(&text)
                .map_err(|e| RagError::index(operation, format!("malformed response: {}", e)));
        }

        serde_json::from_str::<Envelope<T>>(&text)
            .map(|e| e.result)
            .map_err(|e| RagError::index(operation, format!("malformed response: {}", e)))
    }
}

/// 에러 응답에서 메시지 추출
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(e) => format!("{} ({})", e.status.error, status),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, body),
    }
}

/// Query/Search API 응답 본문 디코딩
fn decode_query_response(api: QueryApi, body: &str) -> std::result::Result<Vec<ScoredPoint>, String> {
    let envelope: Envelope<Value> =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;
    let points = api
        .decode(envelope.result)
        .map_err(|e| format!("malformed response: {}", e))?;

    Ok(points
        .into_iter()
        .map(|p| ScoredPoint {
            score: p.score,
            payload: p.payload,
        })
        .collect())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn recreate_collection(&self, name: &str, dimension: usize, metric: Distance) -> Result<()> {
        let segments = ["collections", name];

        // 기존 컬렉션 삭제 (없으면 404 - 무시)
        let (status, text) = self
            .send_raw(Method::DELETE, self.endpoint(&segments), None)
            .await
            .map_err(|e| RagError::index("delete_collection", e.to_string()))?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(RagError::index("delete_collection", error_message(status, &text)));
        }

        let distance = match metric {
            Distance::Cosine => "Cosine",
        };
        let body = json!({ "vectors": { "size": dimension, "distance": distance } });
        let _: Value = self
            .send(Method::PUT, &segments, Some(&body), "create_collection")
            .await?;

        tracing::info!(collection = name, dimension, "Recreated Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let body: Vec<PointBody<'_>> = points
            .iter()
            .map(|p| PointBody {
                id: &p.id,
                vector: &p.vector,
                payload: &p.payload,
            })
            .collect();
        let body = json!({ "points": body });

        // wait=true: 반환 시점에 모든 포인트가 조회 가능
        let mut url = self.endpoint(&["collections", collection, "points"]);
        url.set_query(Some("wait=true"));
        let _: Value = self
            .send_to(Method::PUT, url, false, Some(&body), "upsert")
            .await?;

        tracing::debug!(collection, count = points.len(), "Upserted points to Qdrant");
        Ok(points.len())
    }

    async fn query(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let body = self.query_api.body(vector, limit);
        let (status, text) = self
            .send_raw(
                Method::POST,
                self.endpoint(&self.query_api.segments(collection)),
                Some(&body),
            )
            .await
            .map_err(|e| RagError::query(collection, e.to_string()))?;

        if !status.is_success() {
            return Err(RagError::query(collection, error_message(status, &text)));
        }

        decode_query_response(self.query_api, &text).map_err(|m| RagError::query(collection, m))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let body = json!({ "exact": true });
        let result: CountResult = self
            .send(
                Method::POST,
                &["collections", collection, "points", "count"],
                Some(&body),
                "count",
            )
            .await?;
        Ok(result.count)
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut url = self.endpoint(&["collections", collection, "points", "delete"]);
        url.set_query(Some("wait=true"));
        let body = json!({ "points": ids });
        let _: Value = self
            .send_to(Method::POST, url, false, Some(&body), "delete_points")
            .await?;

        tracing::debug!(collection, count = ids.len(), "Deleted points from Qdrant");
        Ok(())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_api_from_version() {
        assert_eq!(QueryApi::from_version("1.12.4"), QueryApi::Query);
        assert_eq!(QueryApi::from_version("1.10.0"), QueryApi::Query);
        assert_eq!(QueryApi::from_version("v2.0.0"), QueryApi::Query);
        assert_eq!(QueryApi::from_version("1.9.7"), QueryApi::Search);
        assert_eq!(QueryApi::from_version("0.11.3"), QueryApi::Search);
        assert_eq!(QueryApi::from_version("1.8.0-dev"), QueryApi::Search);
        assert_eq!(QueryApi::from_version(""), QueryApi::Query);
        assert_eq!(QueryApi::from_version("unknown"), QueryApi::Query);
    }

    #[test]
    fn test_query_body_shape() {
        let query = QueryApi::Query.body(&[0.5, 0.5], 4);
        assert_eq!(query["limit"], 4);
        assert_eq!(query["with_payload"], true);
        assert!(query.get("query").is_some());

        let search = QueryApi::Search.body(&[0.5, 0.5], 4);
        assert!(search.get("vector").is_some());
        assert_eq!(
            QueryApi::Search.segments("docs"),
            ["collections", "docs", "points", "search"]
        );
    }

    #[test]
    fn test_decode_query_api_response() {
        let body = r#"{
            "result": {"points": [
                {"id": "a", "version": 0, "score": 0.91,
                 "payload": {"source": "deadlines.md", "chunk_index": 0, "text": "Admission deadline is March 1st"}},
                {"id": "b", "version": 0, "score": 0.42}
            ]},
            "status": "ok", "time": 0.001
        }"#;

        let points = decode_query_response(QueryApi::Query, body).unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].score - 0.91).abs() < 1e-6);
        assert_eq!(
            points[0].payload.as_ref().and_then(|p| p.get("source")),
            Some(&json!("deadlines.md"))
        );
        assert!(points[1].payload.is_none());
    }

    #[test]
    fn test_decode_search_api_response() {
        let body = r#"{
            "result": [{"id": 1, "version": 3, "score": 0.7, "payload": {"text": "hello"}}],
            "status": "ok", "time": 0.002
        }"#;
        let points = decode_query_response(QueryApi::Search, body).unwrap();
        assert_eq!(points.len(), 1);

        // 방식이 맞지 않는 응답은 에러
        assert!(decode_query_response(QueryApi::Query, body).is_err());
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"status":{"error":"Not found: Collection `docs` doesn't exist!"},"time":0.0}"#;
        let msg = error_message(StatusCode::NOT_FOUND, body);
        assert!(msg.contains("doesn't exist"));
        assert!(msg.contains("404"));

        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, ""),
            StatusCode::BAD_GATEWAY.to_string()
        );
    }

    #[test]
    fn test_point_serialization() {
        let payload = ChunkPayload {
            source: "guide.md".into(),
            chunk_index: 3,
            text: "text".into(),
        };
        let point = PointBody {
            id: "6f1c0c8e-0000-4000-8000-000000000000",
            vector: &[0.6, 0.8],
            payload: &payload,
        };
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value["payload"]["chunk_index"], 3);
        assert_eq!(value["payload"]["source"], "guide.md");
    }

    #[test]
    fn test_endpoint_segments() {
        let index = QdrantIndex::with_query_api(
            "http://localhost:6333/",
            None,
            Duration::from_secs(1),
            QueryApi::Search,
        )
        .unwrap();
        assert_eq!(index.query_api(), QueryApi::Search);
        assert_eq!(index.endpoint(&[]).as_str(), "http://localhost:6333/");
        assert_eq!(
            index
                .endpoint(&QueryApi::Search.segments("docs"))
                .as_str(),
            "http://localhost:6333/collections/docs/points/search"
        );

        // 컬렉션 이름은 하나의 경로 세그먼트로 인코딩
        assert_eq!(
            index.endpoint(&["collections", "a b/c?d"]).as_str(),
            "http://localhost:6333/collections/a%20b%2Fc%3Fd"
        );

        let prefixed = QdrantIndex::with_query_api(
            "https://qdrant.example.com/proxy/",
            None,
            Duration::from_secs(1),
            QueryApi::Query,
        )
        .unwrap();
        assert_eq!(
            prefixed.endpoint(&["collections", "docs"]).as_str(),
            "https://qdrant.example.com/proxy/collections/docs"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result =
            QdrantIndex::with_query_api("localhost", None, Duration::from_secs(1), QueryApi::Query);
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
