//! Property-based tests for the chunker using proptest

use proptest::prelude::*;
use ragstore::chunker::{Chunker, ChunkingParams, RecursiveChunker};
use ragstore::domain::ChunkingStrategy;

fn params(chunk_size: usize, chunk_overlap: usize) -> ChunkingParams {
    ChunkingParams {
        strategy: ChunkingStrategy::Recursive,
        chunk_size,
        chunk_overlap,
    }
}

proptest! {
    /// Same input, same parameters: byte-identical output
    #[test]
    fn chunking_is_deterministic(
        text in ".{0,400}",
        chunk_size in 1usize..64,
        chunk_overlap in 0usize..64,
    ) {
        let chunker = RecursiveChunker;
        let p = params(chunk_size, chunk_overlap);
        prop_assert_eq!(chunker.chunk(&text, &p).unwrap(), chunker.chunk(&text, &p).unwrap());
    }

    /// No chunk exceeds the window size, and none is empty or untrimmed
    #[test]
    fn chunks_respect_window_and_trim(
        text in "[ a-zA-Z0-9]{0,300}",
        chunk_size in 1usize..48,
        chunk_overlap in 0usize..48,
    ) {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk(&text, &params(chunk_size, chunk_overlap)).unwrap();
        for chunk in &chunks {
            prop_assert!(chunk.chars().count() <= chunk_size);
            prop_assert!(!chunk.is_empty());
            prop_assert_eq!(chunk.as_str(), chunk.trim());
        }
    }

    /// Non-blank input always produces at least one chunk
    #[test]
    fn non_blank_input_produces_chunks(
        text in "[a-z]{1,200}",
        chunk_size in 1usize..64,
        chunk_overlap in 0usize..64,
    ) {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk(&text, &params(chunk_size, chunk_overlap)).unwrap();
        prop_assert!(!chunks.is_empty());
    }

    /// With zero overlap the chunks partition the trimmed input exactly
    #[test]
    fn zero_overlap_partitions_input(
        text in "[a-z]{1,200}",
        chunk_size in 1usize..64,
    ) {
        let chunker = RecursiveChunker;
        let chunks = chunker.chunk(&text, &params(chunk_size, 0)).unwrap();
        prop_assert_eq!(chunks.concat(), text.trim());
    }

    /// Every character of a whitespace-free input appears in some chunk
    #[test]
    fn overlapping_windows_cover_input(
        text in "[a-z]{1,150}",
        chunk_size in 2usize..32,
    ) {
        let chunker = RecursiveChunker;
        // overlap strictly below size so the stride stays positive
        let overlap = chunk_size / 2;
        let chunks = chunker.chunk(&text, &params(chunk_size, overlap)).unwrap();

        let mut covered = 0usize;
        let step = chunk_size - overlap;
        for (i, chunk) in chunks.iter().enumerate() {
            let start = i * step;
            prop_assert!(start <= covered, "gap before window at {}", start);
            covered = covered.max(start + chunk.chars().count());
        }
        prop_assert_eq!(covered, text.len());
    }
}
