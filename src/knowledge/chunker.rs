//! Text Chunking Module
//!
//! 고정 크기 윈도우를 겹쳐가며 텍스트를 분할합니다.
//! 오프셋은 바이트가 아닌 문자(char) 단위이므로 멀티바이트 문자가 잘리지 않습니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 윈도우 크기 (문자 수)
    pub chunk_size: usize,
    /// 윈도우 간 오버랩 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 120,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// 윈도우 시작 오프셋 간격 (최소 1)
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 슬라이딩 윈도우 청커
///
/// `0, step, 2*step, ...` 위치에서 `chunk_size` 문자 윈도우를 잘라냅니다.
/// 각 윈도우는 trim 되며, 비어버린 윈도우는 버리지만 오프셋은 그대로 전진합니다.
#[derive(Debug, Clone, Default)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.chunk_size, self.config.overlap)
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

/// 텍스트를 겹치는 고정 크기 윈도우로 분할
///
/// 같은 입력과 파라미터에 대해 항상 같은 결과를 반환합니다.
///
/// # Arguments
/// * `text` - 분할할 텍스트 (앞뒤 공백은 제거됨)
/// * `chunk_size` - 윈도우 크기 (문자 수)
/// * `overlap` - 윈도우 간 오버랩 (문자 수)
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }

    let step = ChunkConfig::new(chunk_size, overlap).step();

    // 문자 오프셋 -> 바이트 오프셋 테이블 (마지막 원소는 text.len())
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut offset = 0;

    while offset < char_len {
        let end = (offset + chunk_size).min(char_len);
        let window = text[bounds[offset]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        offset += step;
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 20, 5).is_empty());
        assert!(chunk_text("   \n\t ", 20, 5).is_empty());
    }

    #[test]
    fn test_chunk_text_small() {
        let chunks = chunk_text("  hello world  ", 100, 10);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_chunk_text_quick_brown_fox() {
        let text = "The quick brown fox. The fox is quick.";
        let chunks = chunk_text(text, 20, 5);

        assert_eq!(
            chunks,
            vec!["The quick brown fox.", "fox. The fox is qui", "s quick."]
        );
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));

        // 두 번째 청크는 첫 번째 청크의 마지막 5 문자 안에서 시작
        let first = &chunks[0];
        let tail = &first[first.len() - 5..];
        assert!(tail.contains(&chunks[1][..3]));
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let chunks = chunk_text("abcdefgh", 4, 0);
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_chunk_text_whitespace_window_dropped() {
        // 두 번째 윈도우는 공백뿐이라 버려지지만 세 번째 윈도우는 유지
        let text = format!("abcd{}efgh", " ".repeat(4));
        let chunks = chunk_text(&text, 4, 0);
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_chunk_text_step_collapses_to_one() {
        // overlap >= chunk_size 이면 step = 1
        let chunks = chunk_text("abcde", 3, 3);
        assert_eq!(chunks, vec!["abc", "bcd", "cde", "de", "e"]);
    }

    #[test]
    fn test_chunk_text_multibyte() {
        let text = "안녕하세요 세계 여러분";
        let chunks = chunk_text(text, 5, 1);
        assert_eq!(chunks[0], "안녕하세요");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn test_window_chunker_uses_config() {
        let chunker = WindowChunker::new(ChunkConfig::new(4, 1));
        assert_eq!(chunker.chunk("abcdefg"), vec!["abcd", "defg", "g"]);
        assert_eq!(chunker.name(), "WindowChunker");
        assert_eq!(ChunkConfig::default().step(), 880);
    }

    proptest! {
        #[test]
        fn prop_chunk_count_and_bounds(
            text in "[a-z]{1,200}",
            size in 2usize..40,
            overlap_ratio in 0usize..100,
        ) {
            let overlap = (size - 1) * overlap_ratio / 100;
            let chunks = chunk_text(&text, size, overlap);
            let step = size - overlap;
            let len = text.chars().count();

            // 공백이 없으므로 trim 으로 버려지는 윈도우가 없음
            prop_assert_eq!(chunks.len(), (len + step - 1) / step);
            prop_assert!(chunks.iter().all(|c| c.chars().count() <= size));

            for (i, chunk) in chunks.iter().enumerate() {
                let start = i * step;
                let expected: String = text.chars().skip(start).take(size).collect();
                prop_assert_eq!(chunk, &expected);
            }
        }

        #[test]
        fn prop_chunk_deterministic(text in ".{0,300}", size in 1usize..50, overlap in 0usize..60) {
            prop_assert_eq!(chunk_text(&text, size, overlap), chunk_text(&text, size, overlap));
        }
    }
}
