//! kai-rag - 입학 상담 에이전트용 RAG 파이프라인
//!
//! 문서 코퍼스를 청킹/임베딩하여 Qdrant 컬렉션에 색인하고,
//! 사용자 쿼리에 대해 출처가 달린 상위 청크를 반환합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use config::RagConfig;
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, TaskType};
pub use error::{RagError, Result};
pub use knowledge::{
    chunk_text, normalize, rag_search, ChunkConfig, Chunker, IdStrategy, IndexWriter,
    IngestReport, Ingestor, MemoryIndex, QdrantIndex, SearchEngine, SearchResult, ToolResponse,
    VectorIndex, WindowChunker,
};
