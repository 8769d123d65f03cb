//! Text chunking for the ingestion and migration pipelines

use crate::domain::{ChunkingStrategy, Configuration};
use crate::error::{RagError, Result};

/// Chunking parameters pinned by a collection's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub strategy: ChunkingStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingParams {
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            strategy: config.chunking_strategy,
            chunk_size: config.chunk_size.max(0) as usize,
            chunk_overlap: config.chunk_overlap.max(0) as usize,
        }
    }
}

/// Splits text into chunks. Implementations must be deterministic: identical
/// input and parameters produce byte-identical output.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str, params: &ChunkingParams) -> Result<Vec<String>>;
}

/// Chunker using a sliding character window with overlap.
///
/// The window advances by `chunk_size - chunk_overlap` characters (at least
/// one). Indexing is by character, not byte, so multi-byte text never splits
/// inside a code point. Each window is trimmed and empty windows are dropped.
pub struct RecursiveChunker;

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str, params: &ChunkingParams) -> Result<Vec<String>> {
        if params.strategy != ChunkingStrategy::Recursive {
            return Err(RagError::Validation(format!(
                "unsupported chunking strategy: {}",
                params.strategy
            )));
        }
        if params.chunk_size == 0 {
            return Err(RagError::Validation("chunk_size must be positive".to_string()));
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }

        let chars: Vec<char> = text.chars().collect();
        let step = params.chunk_size.saturating_sub(params.chunk_overlap).max(1);

        let mut chunks = Vec::with_capacity(chars.len() / step + 1);
        let mut start = 0;
        while start < chars.len() {
            let end = (start + params.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if !window.is_empty() {
                chunks.push(window.to_string());
            }
            start += step;
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chunk_size: usize, chunk_overlap: usize) -> ChunkingParams {
        ChunkingParams {
            strategy: ChunkingStrategy::Recursive,
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = RecursiveChunker;
        let text = "This is a short text.";
        let chunks = chunker.chunk(text, &params(512, 50)).unwrap();

        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        let chunker = RecursiveChunker;
        assert!(chunker.chunk("", &params(100, 10)).unwrap().is_empty());
        assert!(chunker.chunk("   \n\t ", &params(100, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_input_is_trimmed() {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk("  hello world  ", &params(100, 0)).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_overlap_windows() {
        let chunker = RecursiveChunker;
        // 10 chars, window 6, overlap 2 -> stride 4: [0..6), [4..10), [8..10)
        let chunks = chunker.chunk("abcdefghij", &params(6, 2)).unwrap();
        assert_eq!(chunks, vec!["abcdef", "efghij", "ij"]);
    }

    #[test]
    fn test_zero_overlap_partitions_text() {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk("abcdefghij", &params(4, 0)).unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_advances() {
        let chunker = RecursiveChunker;
        // stride clamps to 1, so the walk terminates
        let chunks = chunker.chunk("abcd", &params(2, 5)).unwrap();
        assert_eq!(chunks, vec!["ab", "bc", "cd", "d"]);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk("привет мир", &params(4, 1)).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }

    #[test]
    fn test_deterministic() {
        let chunker = RecursiveChunker;
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let p = params(64, 16);
        assert_eq!(chunker.chunk(&text, &p).unwrap(), chunker.chunk(&text, &p).unwrap());
    }

    #[test]
    fn test_unsupported_strategies_fail() {
        let chunker = RecursiveChunker;
        for strategy in [ChunkingStrategy::Fixed, ChunkingStrategy::Semantic] {
            let p = ChunkingParams {
                strategy,
                chunk_size: 100,
                chunk_overlap: 10,
            };
            let err = chunker.chunk("text", &p).unwrap_err();
            assert!(matches!(err, RagError::Validation(_)));
        }
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let chunker = RecursiveChunker;
        assert!(chunker.chunk("text", &params(0, 0)).is_err());
    }
}
