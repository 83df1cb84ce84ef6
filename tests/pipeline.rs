//! 수집 -> 검색 전체 흐름 테스트 (MemoryIndex + 결정적 임베더)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use kai_rag::knowledge::{IndexWriter, NO_GROUNDING};
use kai_rag::{
    chunk_text, rag_search, EmbeddingProvider, Ingestor, MemoryIndex, RagConfig, RagError,
    Result, SearchEngine, ToolResponse, VectorIndex,
};

const DIM: usize = 512;
const COLLECTION: &str = "admissions_test";

/// 단어 해시 기반 bag-of-words 임베더
struct HashingEmbedder;

fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            });
        vector[(hash % DIM as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed(text))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// 요청보다 하나 적은 벡터를 반환하는 임베더
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|t| embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed(text))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "short"
    }
}

fn config() -> RagConfig {
    RagConfig {
        collection: COLLECTION.to_string(),
        dimension: DIM,
        ..Default::default()
    }
}

fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::Builder::new().prefix("corpus").tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

async fn ingest(config: &RagConfig, index: Arc<MemoryIndex>, dir: &Path) -> usize {
    Ingestor::new(config, Arc::new(HashingEmbedder), index)
        .run(dir)
        .await
        .unwrap()
        .entries_written
}

fn engine(index: Arc<MemoryIndex>) -> SearchEngine {
    SearchEngine::new(Arc::new(HashingEmbedder), index, COLLECTION)
}

#[test]
fn test_chunking_short_document() {
    let chunks = chunk_text("The quick brown fox. The fox is quick.", 20, 5);
    assert!(chunks.len() >= 2);
    assert_eq!(chunks[0], "The quick brown fox.");
}

#[tokio::test]
async fn test_ingest_then_search_grounds_answer() {
    let dir = corpus(&[
        ("deadlines.md", "Admission deadline is March 1st"),
        ("tuition.md", "Tuition is 5000 dollars per semester"),
        ("empty.txt", "   \n"),
    ]);
    let index = Arc::new(MemoryIndex::new());

    let written = ingest(&config(), index.clone(), dir.path()).await;
    assert_eq!(written, 2);
    assert_eq!(index.count(COLLECTION).await.unwrap(), 2);

    let results = engine(index).search("when is the deadline", 4).await.unwrap();
    assert!(!results.is_empty());
    let top = &results[0];
    assert!(top.text.as_deref().unwrap().contains("March 1st"));
    assert_eq!(top.source.as_deref(), Some("deadlines.md"));
    assert_eq!(top.chunk_index, Some(0));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_search_returns_at_most_k() {
    // 10 문자 x 1000 청크
    let text: String = (0..1000).map(|i| format!("doc{:06} ", i % 97)).collect();
    let dir = corpus(&[("large.txt", &text)]);
    let config = RagConfig {
        chunk_size: 10,
        chunk_overlap: 0,
        batch_size: 100,
        embed_concurrency: 4,
        ..config()
    };
    let index = Arc::new(MemoryIndex::new());

    let written = ingest(&config, index.clone(), dir.path()).await;
    assert_eq!(written, 1000);

    let results = engine(index).search("doc000042", 4).await.unwrap();
    assert!(results.len() <= 4);
    assert!(!results.is_empty());
}

#[tokio::test]
async fn test_zero_k_is_validation_error() {
    let index = Arc::new(MemoryIndex::new());
    let err = engine(index.clone()).search("deadline", 0).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let response = rag_search(&engine(index), "deadline", 0).await;
    assert!(!response.is_ok());
}

#[tokio::test]
async fn test_recreate_empties_collection() {
    let dir = corpus(&[("deadlines.md", "Admission deadline is March 1st")]);
    let index = Arc::new(MemoryIndex::new());
    ingest(&config(), index.clone(), dir.path()).await;

    IndexWriter::new(index.clone(), COLLECTION, DIM)
        .recreate_collection()
        .await
        .unwrap();

    let results = engine(index).search("deadline", 4).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_count_mismatch_aborts_without_writing() {
    let dir = corpus(&[
        ("a.md", "Admission deadline is March 1st"),
        ("b.md", "Tuition is 5000 dollars per semester"),
    ]);
    let index = Arc::new(MemoryIndex::new());

    let err = Ingestor::new(&config(), Arc::new(ShortEmbedder), index.clone())
        .run(dir.path())
        .await
        .unwrap_err();

    match err {
        RagError::IngestionAbort { source, .. } => {
            assert!(matches!(*source, RagError::EmbeddingProvider { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(index.count(COLLECTION).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_directory_keeps_existing_collection() {
    let dir = corpus(&[("deadlines.md", "Admission deadline is March 1st")]);
    let index = Arc::new(MemoryIndex::new());
    ingest(&config(), index.clone(), dir.path()).await;

    let err = Ingestor::new(&config(), Arc::new(HashingEmbedder), index.clone())
        .run(&dir.path().join("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::IngestionAbort { .. }));
    assert_eq!(index.count(COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn test_tool_reports_query_failure_without_details() {
    // 수집하지 않은 컬렉션
    let response = rag_search(&engine(Arc::new(MemoryIndex::new())), "deadline", 4).await;
    assert_eq!(
        response,
        ToolResponse::Error {
            message: NO_GROUNDING.to_string()
        }
    );
}
