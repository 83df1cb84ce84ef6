//! Knowledge 모듈 - 시맨틱 인덱스 구축 및 검색
//!
//! - Chunker: 겹치는 고정 크기 윈도우 분할
//! - Vector: 정규화 유틸리티 + 벡터 인덱스 트레이트
//! - Qdrant / Memory: 인덱스 백엔드
//! - Writer: 컬렉션 재생성 + upsert
//! - Search: 쿼리 임베딩 + top-k 검색
//! - Ingest: 디렉토리 전체 재색인

mod chunker;
mod vector;
mod qdrant;
mod memory;
mod writer;
mod search;
mod ingest;
pub mod tool;

// Re-exports
pub use chunker::{chunk_text, ChunkConfig, Chunker, WindowChunker};
pub use vector::{
    dot_product, l2_norm, normalize, ChunkPayload, Distance, IndexPoint, ScoredPoint,
    SearchResult, VectorIndex,
};
pub use qdrant::{QdrantIndex, QueryApi};
pub use memory::MemoryIndex;
pub use writer::{IdStrategy, IndexEntry, IndexWriter};
pub use search::{validate_limit, SearchEngine};
pub use ingest::{IngestReport, Ingestor};
pub use tool::{rag_search, ToolResponse, NO_GROUNDING};
