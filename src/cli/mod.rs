//! CLI 모듈
//!
//! kai-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RagConfig;
use crate::embedding::{has_api_key, GeminiEmbedding};
use crate::knowledge::{rag_search, IdStrategy, Ingestor, QdrantIndex, SearchEngine, ToolResponse, VectorIndex};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kai-rag")]
#[command(version, about = "입학 문서 RAG 파이프라인 (Gemini + Qdrant)", long_about = None)]
pub struct Cli {
    /// 컬렉션 이름 (QDRANT_COLLECTION 대신 사용)
    #[arg(short, long, global = true)]
    pub collection: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 폴더 전체를 재색인 (컬렉션을 비우고 다시 생성)
    Ingest {
        /// 문서 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 청크 크기 (문자 수)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 청크 오버랩 (문자 수)
        #[arg(long)]
        overlap: Option<usize>,

        /// 임베딩 배치 크기
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// 실패한 임베딩 배치 재시도 횟수
        #[arg(long)]
        retries: Option<u32>,

        /// source + chunk_index 기반 ID 사용 (재수집 시 덮어쓰기)
        #[arg(long)]
        deterministic_ids: bool,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// 에이전트 도구 형식(JSON)으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }

    match cli.command {
        Commands::Ingest {
            dir,
            chunk_size,
            overlap,
            batch_size,
            retries,
            deterministic_ids,
        } => {
            if let Some(dir) = dir {
                config.docs_dir = dir;
            }
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                config.chunk_overlap = overlap;
            }
            if let Some(batch) = batch_size {
                config.batch_size = batch;
            }
            if let Some(retries) = retries {
                config.embed_retries = retries;
            }
            if deterministic_ids {
                config.id_strategy = IdStrategy::Deterministic;
            }
            cmd_ingest(&config).await
        }
        Commands::Query { query, limit, json } => {
            let limit = limit.unwrap_or(config.top_k as i64);
            cmd_query(&config, &query, limit, json).await
        }
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Component Construction
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn build_embedder(config: &RagConfig) -> Result<GeminiEmbedding> {
    let embedder = GeminiEmbedding::from_config(config).context("임베딩 프로바이더 생성 실패")?;
    Ok(if config.embed_rpm > 0 {
        embedder.with_rate_limit(config.embed_rpm)
    } else {
        embedder
    })
}

async fn connect_index(config: &RagConfig) -> Result<QdrantIndex> {
    QdrantIndex::connect(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .await
    .with_context(|| format!("Qdrant 연결 실패: {}", config.qdrant_url))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 재색인 명령어 (ingest)
///
/// 실패 시 에러를 반환하여 프로세스가 0 이 아닌 코드로 종료됩니다.
async fn cmd_ingest(config: &RagConfig) -> Result<()> {
    config.validate()?;
    require_api_key()?;

    let embedder = Arc::new(build_embedder(config)?);
    let index = Arc::new(connect_index(config).await?);

    println!("[*] 문서 폴더: {}", config.docs_dir.display());
    println!(
        "    청크: {} / 오버랩: {} / 배치: {}",
        config.chunk_size, config.chunk_overlap, config.batch_size
    );

    let ingestor = Ingestor::new(config, embedder, index);
    let report = ingestor.run(&config.docs_dir).await.context("수집 실패")?;

    println!();
    println!(
        "[OK] Ingested {} chunks into Qdrant collection '{}' at {}",
        report.entries_written, report.collection, config.qdrant_url
    );
    println!(
        "     파일: {} (빈 파일 {}), 총 크기: {}, 소요: {:.1}s",
        report.files,
        report.empty_files,
        format_bytes(report.bytes as usize),
        report.elapsed.as_secs_f64()
    );

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(config: &RagConfig, query: &str, limit: i64, json: bool) -> Result<()> {
    config.validate()?;
    require_api_key()?;

    let embedder = Arc::new(build_embedder(config)?);
    let index = Arc::new(connect_index(config).await?);
    let engine = SearchEngine::new(embedder, index, config.collection.clone());

    let response = rag_search(&engine, query, limit).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        ToolResponse::Ok { results } if results.is_empty() => {
            println!("[!] 검색 결과가 없습니다.");
        }
        ToolResponse::Ok { results } => {
            println!("[OK] 검색 결과 ({} 건):\n", results.len());
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [점수: {:.4}] {} #{}",
                    i + 1,
                    result.score,
                    result.source.as_deref().unwrap_or("-"),
                    result
                        .chunk_index
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                if let Some(ref text) = result.text {
                    println!("   내용: {}", truncate_text(text, 200));
                }
                println!();
            }
        }
        ToolResponse::Error { message } => {
            println!("[!] {}", message);
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("kai-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if let Err(e) = config.validate() {
        println!("[!] 설정 오류: {}", e);
    }

    println!("[*] Qdrant: {}", config.qdrant_url);
    println!("[*] 컬렉션: {}", config.collection);
    println!(
        "[*] 임베딩: {} ({} 차원, 배치 {})",
        config.embed_model, config.dimension, config.batch_size
    );
    println!("[*] 문서 폴더: {}", config.docs_dir.display());
    println!("[*] ID 방식: {}", config.id_strategy);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match connect_index(config).await {
        Ok(index) => {
            println!("[OK] Qdrant 연결됨 (쿼리 방식: {:?})", index.query_api());
            match index.count(&config.collection).await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
                Err(e) => println!("[!] 컬렉션 조회 실패: {}", e),
            }
        }
        Err(e) => {
            println!("[!] {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
