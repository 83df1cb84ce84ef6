//! 파일 수집 모듈
//!
//! 문서 디렉토리를 재귀적으로 탐색하여 텍스트 파일만 수집합니다.
//! 인식하지 못하는 확장자는 조용히 건너뛰고, 탐색 에러는 즉시 실패합니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{RagError, Result};

/// 기본 수집 확장자
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["md", "txt"];

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 이름 (페이로드의 `source`)
    pub name: String,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 파일 내용을 UTF-8 로 읽기 (잘못된 바이트 시퀀스는 버림)
    pub async fn read_text(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| RagError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(decode_utf8_ignoring_invalid(&bytes))
    }
}

/// 유효한 UTF-8 구간만 이어붙임
fn decode_utf8_ignoring_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일/디렉토리 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 수집할 확장자 (대소문자 무시)
    pub extensions: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: false,
            include_hidden: true,
            max_file_size: 0,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집 (경로 순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            return Err(RagError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .parents(self.config.respect_gitignore)
            .ignore(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| RagError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if !self.is_eligible(entry.path()) {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| RagError::Io {
                path: entry.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;

            if self.config.max_file_size > 0 && metadata.len() > self.config.max_file_size {
                tracing::warn!(
                    "Skipping large file: {:?} ({} bytes)",
                    entry.path(),
                    metadata.len()
                );
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(CollectedFile {
                path: entry.into_path(),
                name,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    /// 확장자 필터
    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================
