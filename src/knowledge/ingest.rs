//! Ingestion - 문서 디렉토리 전체 재색인
//!
//! 파일 수집 -> 청킹 -> 배치 임베딩 -> 정규화 -> 엔트리 누적 -> upsert 순서로 진행합니다.
//! 첫 번째 치명적 에러에서 전체 실행을 중단하며, upsert는 모든 파일 처리 후에만 일어나므로
//! 일부만 기록된 코퍼스는 남지 않습니다.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::RagConfig;
use crate::embedding::{validate_batch, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::chunker::{ChunkConfig, Chunker, WindowChunker};
use super::vector::{normalize, ChunkPayload, VectorIndex};
use super::writer::{IndexEntry, IndexWriter};

/// 재시도 시 초기 백오프
const INITIAL_BACKOFF: Duration = Duration::from_millis(2000);

// ============================================================================
// Report
// ============================================================================

/// 수집 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: String,
    /// 처리한 파일 수
    pub files: usize,
    /// 청크가 하나도 없던 파일 수
    pub empty_files: usize,
    /// 읽은 총 바이트
    pub bytes: u64,
    pub chunks: usize,
    pub entries_written: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

// ============================================================================
// Ingestor
// ============================================================================

/// 수집 오케스트레이터
pub struct Ingestor {
    collector: FileCollector,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    writer: IndexWriter,
    dimension: usize,
    batch_size: usize,
    concurrency: usize,
    max_retries: u32,
    initial_backoff: Duration,
}

impl Ingestor {
    /// 설정으로 생성
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let writer = IndexWriter::new(index, config.collection.clone(), config.dimension)
            .with_id_strategy(config.id_strategy)
            .with_max_batch(config.upsert_batch_size);

        Self {
            collector: FileCollector::with_defaults(),
            chunker: Box::new(WindowChunker::new(ChunkConfig::new(
                config.chunk_size,
                config.chunk_overlap,
            ))),
            embedder,
            writer,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            concurrency: config.embed_concurrency.max(1),
            max_retries: config.embed_retries,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    pub fn with_collector(mut self, config: CollectorConfig) -> Self {
        self.collector = FileCollector::new(config);
        self
    }

    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// 재시도 백오프 변경 (시도마다 두 배)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// 디렉토리 전체 재색인
    ///
    /// 컬렉션을 비운 뒤 모든 파일을 임베딩하고 한 번에 기록합니다.
    /// 어떤 단계든 실패하면 `IngestionAbort` 에러를 반환합니다.
    pub async fn run(&self, dir: &Path) -> Result<IngestReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        if self.embedder.dimension() != self.dimension {
            return Err(RagError::Config(format!(
                "embedder '{}' produces {} dimensions, collection expects {}",
                self.embedder.name(),
                self.embedder.dimension(),
                self.dimension
            )));
        }

        let files = self
            .collector
            .collect_directory(dir)
            .map_err(|e| e.abort("collecting files"))?;

        self.writer
            .recreate_collection()
            .await
            .map_err(|e| e.abort("recreating collection"))?;

        tracing::info!(
            collection = self.writer.collection(),
            files = files.len(),
            chunker = self.chunker.name(),
            "Starting ingestion"
        );

        let mut entries = Vec::new();
        let mut empty_files = 0;
        let mut bytes = 0;

        for (i, file) in files.iter().enumerate() {
            let text = file
                .read_text()
                .await
                .map_err(|e| e.abort(format!("reading {}", file.name)))?;
            bytes += file.size;

            let chunks = self.chunker.chunk(&text);
            if chunks.is_empty() {
                tracing::warn!("No chunks generated for {}", file.name);
                empty_files += 1;
                continue;
            }

            tracing::debug!("[{}/{}] {} ({} chunks)", i + 1, files.len(), file.name, chunks.len());

            let file_entries = self
                .embed_chunks(&file.name, &chunks)
                .await
                .map_err(|e| e.abort(format!("embedding {}", file.name)))?;
            entries.extend(file_entries);
        }

        let chunks = entries.len();
        let entries_written = self
            .writer
            .upsert(entries)
            .await
            .map_err(|e| e.abort("upsert"))?;

        let report = IngestReport {
            collection: self.writer.collection().to_string(),
            files: files.len(),
            empty_files,
            bytes,
            chunks,
            entries_written,
            started_at,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            collection = %report.collection,
            files = report.files,
            entries = report.entries_written,
            "Ingestion finished in {:?}",
            report.elapsed
        );
        Ok(report)
    }

    /// 한 문서의 청크를 배치 임베딩하여 엔트리로 변환
    ///
    /// 배치는 최대 `concurrency` 개까지 동시에 요청되지만 결과 순서는 유지됩니다.
    pub async fn embed_chunks(&self, source: &str, chunks: &[String]) -> Result<Vec<IndexEntry>> {
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(chunks.chunks(self.batch_size))
            .map(|batch| self.embed_batch(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let entries = chunks
            .iter()
            .zip(batches.into_iter().flatten())
            .enumerate()
            .map(|(chunk_index, (text, raw))| IndexEntry {
                vector: normalize(&raw),
                payload: ChunkPayload {
                    source: source.to_string(),
                    chunk_index: chunk_index as u64,
                    text: text.clone(),
                },
            })
            .collect();

        Ok(entries)
    }

    /// 배치 하나를 임베딩 (실패 시 같은 배치로 재시도)
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;

        loop {
            let result = self
                .embedder
                .embed_documents(batch)
                .await
                .and_then(|vectors| validate_batch(batch.len(), vectors, self.dimension));

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < self.max_retries && !e.is_validation() => {
                    let backoff = retry_backoff(self.initial_backoff, attempt);
                    tracing::warn!(
                        "Embedding batch failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `initial * 2^attempt` (오버플로 시 포화)
fn retry_backoff(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt))
}

// ============================================================================
// Tests
// ============================================================================
