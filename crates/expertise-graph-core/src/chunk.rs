//! Token-budgeted, overlap-aware text chunker.
//!
//! Splits document text into ordered chunks whose *estimated* token count
//! stays within a budget. Splitting prefers paragraph and markdown block
//! boundaries, falls back to sentences, and finally to fixed-size
//! character slices for text with no usable boundary.
//!
//! # Algorithm
//!
//! 1. Normalize line endings and split the text into blocks. A line is a
//!    boundary when it is blank or starts with a markdown heading
//!    (`#`–`######`), a bullet (`-`/`*`) or a numbered item (`1.`). Each
//!    non-blank boundary line becomes its own block; consecutive ordinary
//!    lines form one block.
//! 2. Greedily pack blocks into the current chunk (joined by one space)
//!    while its estimated tokens stay within the budget.
//! 3. When a unit does not fit, flush the chunk and seed the next one with
//!    an overlap window: whole units taken backward from the end of the
//!    flushed chunk until `overlap_tokens` is reached.
//! 4. A block over budget is split into sentences; a sentence over budget
//!    is hard-cut into `max(50, budget × 4)` character slices.
//!
//! The chunker is a total function: it never fails and always terminates.
//!
//! # Example
//!
//! ```rust
//! use expertise_graph_core::chunk::{chunk, ChunkOptions};
//!
//! let chunks = chunk("# Intro\n\nHello world.", ChunkOptions::default());
//! assert_eq!(chunks, vec!["# Intro Hello world.".to_string()]);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Lower clamp for [`ChunkOptions::token_budget`].
pub const MIN_TOKEN_BUDGET: usize = 100;
/// Upper clamp for [`ChunkOptions::token_budget`].
pub const MAX_TOKEN_BUDGET: usize = 1200;

const CHARS_PER_TOKEN: usize = 4;
const MIN_SLICE_CHARS: usize = 50;

static BOUNDARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6}\s|[-*]\s|\d+\.\s)").expect("valid boundary regex"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+|[.!?]+\s+").expect("valid sentence regex"));

/// Chunk sizing parameters. Values are clamped before use, see [`ChunkOptions::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub token_budget: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkOptions {
    /// 550 characters / 70 characters of overlap, expressed in tokens.
    fn default() -> Self {
        Self {
            token_budget: 138,
            overlap_tokens: 18,
        }
    }
}

impl ChunkOptions {
    /// Clamp the budget to `[100, 1200]` and the overlap to `[0, budget - 1]`.
    pub fn clamped(self) -> Self {
        let token_budget = self.token_budget.clamp(MIN_TOKEN_BUDGET, MAX_TOKEN_BUDGET);
        let overlap_tokens = self.overlap_tokens.min(token_budget - 1);
        Self {
            token_budget,
            overlap_tokens,
        }
    }
}

/// Estimate the token count of `s`.
///
/// `max(1, ceil(max(chars / 4, words × 0.75)))`, where an empty string
/// counts as one word.
pub fn estimate_tokens(s: &str) -> usize {
    let chars = s.chars().count() as f64;
    let words = s.split_whitespace().count().max(1) as f64;
    let estimate = (chars / CHARS_PER_TOKEN as f64).max(words * 0.75).ceil() as usize;
    estimate.max(1)
}

/// Split `text` into ordered chunks according to `opts`.
///
/// Returns an empty vector for empty or whitespace-only input; never
/// returns an empty chunk.
pub fn chunk(text: &str, opts: ChunkOptions) -> Vec<String> {
    let opts = opts.clamped();
    let slice_chars = (opts.token_budget * CHARS_PER_TOKEN).max(MIN_SLICE_CHARS);
    let mut packer = Packer::new(opts);

    for block in split_blocks(text) {
        if estimate_tokens(&block) <= opts.token_budget {
            packer.push_unit(block);
            continue;
        }
        for sentence in split_sentences(&block) {
            if estimate_tokens(&sentence) <= opts.token_budget {
                packer.push_unit(sentence);
            } else {
                for slice in hard_cut(&sentence, slice_chars) {
                    packer.push_unit(slice);
                }
            }
        }
    }

    packer.finish()
}

/// Chunk a document body into [`Chunk`] records.
///
/// Indices are contiguous from 0 in chunker order; each chunk gets a fresh
/// UUID and the SHA-256 of its text.
pub fn chunk_document(document_id: &str, text: &str, opts: ChunkOptions) -> Vec<Chunk> {
    chunk(text, opts)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, piece))
        .collect()
}

/// Split text into paragraph and markdown blocks.
pub fn split_blocks(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut blocks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        let blank = line.trim().is_empty();
        if blank || BOUNDARY_LINE.is_match(line) {
            flush_lines(&mut buf, &mut blocks);
            if !blank {
                blocks.push(line.trim().to_string());
            }
        } else {
            buf.push(line);
        }
    }
    flush_lines(&mut buf, &mut blocks);

    blocks
}

fn flush_lines(buf: &mut Vec<&str>, blocks: &mut Vec<String>) {
    let joined = buf.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
    buf.clear();
}

/// Split a block into sentences ending at newlines or `.`/`!`/`?` runs
/// followed by whitespace. Delimiters stay attached to their sentence.
pub fn split_sentences(block: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(block) {
        let sentence = block[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let tail = block[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    if sentences.is_empty() {
        sentences.push(block.trim().to_string());
    }
    sentences
}

/// Cut `s` into consecutive slices of `slice_chars` characters.
fn hard_cut(s: &str, slice_chars: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(slice_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Greedy accumulator for chunk units.
struct Packer {
    opts: ChunkOptions,
    chunks: Vec<String>,
    current: Vec<String>,
}

impl Packer {
    fn new(opts: ChunkOptions) -> Self {
        Self {
            opts,
            chunks: Vec::new(),
            current: Vec::new(),
        }
    }

    fn push_unit(&mut self, unit: String) {
        if !self.current.is_empty() && !self.fits(&self.current, &unit) {
            let tail = self.flush();
            self.seed(tail, &unit);
        }
        self.current.push(unit);
    }

    fn fits(&self, units: &[String], incoming: &str) -> bool {
        let mut text = units.join(" ");
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(incoming);
        estimate_tokens(&text) <= self.opts.token_budget
    }

    /// Emit the current chunk and return its overlap tail.
    fn flush(&mut self) -> Vec<String> {
        let units = std::mem::take(&mut self.current);
        if units.is_empty() {
            return Vec::new();
        }
        let text = units.join(" ");
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.chunks.push(trimmed.to_string());
        }
        self.overlap_tail(&units)
    }

    fn overlap_tail(&self, units: &[String]) -> Vec<String> {
        if self.opts.overlap_tokens == 0 {
            return Vec::new();
        }
        let mut tail = Vec::new();
        let mut taken = 0;
        for unit in units.iter().rev() {
            let tokens = estimate_tokens(unit);
            if taken + tokens > self.opts.overlap_tokens && !tail.is_empty() {
                break;
            }
            tail.push(unit.clone());
            taken += tokens;
        }
        tail.reverse();
        tail
    }

    /// Start the next chunk from the overlap tail, dropping leading units
    /// that would push it over budget together with `incoming`.
    fn seed(&mut self, mut tail: Vec<String>, incoming: &str) {
        while !tail.is_empty() && !self.fits(&tail, incoming) {
            tail.remove(0);
        }
        self.current = tail;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

fn make_chunk(document_id: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(token_budget: usize, overlap_tokens: usize) -> ChunkOptions {
        ChunkOptions {
            token_budget,
            overlap_tokens,
        }
    }

    #[test]
    fn test_estimate_tokens_heuristic() {
        assert_eq!(estimate_tokens(""), 1);
        // 11 chars / 4 = 2.75 vs 2 words * 0.75 = 1.5
        assert_eq!(estimate_tokens("hello world"), 3);
        // 15 chars / 4 = 3.75 vs 8 words * 0.75 = 6
        assert_eq!(estimate_tokens("a b c d e f g h"), 6);
        assert_eq!(estimate_tokens("abcd"), 1);
    }

    #[test]
    fn test_options_clamped() {
        assert_eq!(opts(5, 500).clamped(), opts(100, 99));
        assert_eq!(opts(5000, 10).clamped(), opts(1200, 10));
        assert_eq!(opts(300, 20).clamped(), opts(300, 20));
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk("", ChunkOptions::default()).is_empty());
        assert!(chunk("  \n\n\t \r\n", ChunkOptions::default()).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk("Hello, world!", ChunkOptions::default());
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_blocks_joined_with_single_space() {
        let chunks = chunk(
            "First paragraph.\n\nSecond paragraph.",
            ChunkOptions::default(),
        );
        assert_eq!(chunks, vec!["First paragraph. Second paragraph.".to_string()]);
    }

    #[test]
    fn test_split_blocks_markdown_boundaries() {
        let text = "# Title\nintro line one\nintro line two\n\n- item one\n- item two\n1. first\nplain";
        let blocks = split_blocks(text);
        assert_eq!(
            blocks,
            vec![
                "# Title",
                "intro line one\nintro line two",
                "- item one",
                "- item two",
                "1. first",
                "plain",
            ]
        );
    }

    #[test]
    fn test_split_blocks_crlf() {
        let blocks = split_blocks("one\r\ntwo\r\n\r\nthree");
        assert_eq!(blocks, vec!["one\ntwo", "three"]);
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("Is it? Yes!  It is.\nNew line here");
        assert_eq!(s, vec!["Is it?", "Yes!", "It is.", "New line here"]);
        assert_eq!(split_sentences("no boundary"), vec!["no boundary"]);
    }

    fn numbered_paragraph(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {:03} talks about distributed caching layers.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_long_paragraph_overlaps_previous_tail() {
        let text = numbered_paragraph(34);
        assert!(text.len() >= 2000);

        let chunks = chunk(&text, opts(200, 20));
        assert!(chunks.len() >= 2, "expected several chunks, got {}", chunks.len());

        for pair in chunks.windows(2) {
            let first_sentence = &pair[1][..59];
            assert!(first_sentence.ends_with('.'));
            assert!(
                pair[0].ends_with(first_sentence),
                "chunk does not start with previous tail: {:?}",
                first_sentence
            );
            assert!(estimate_tokens(first_sentence) <= 20);
        }
    }

    #[test]
    fn test_token_budget_respected() {
        let mut text = String::new();
        for section in 0..12 {
            text.push_str(&format!("## Section {}\n\n", section));
            text.push_str(&numbered_paragraph(section % 5 + 1));
            text.push_str("\n\n- a bullet point about caches\n- another bullet\n\n");
        }
        for budget in [100, 150, 400] {
            for c in chunk(&text, opts(budget, 30)) {
                assert!(
                    estimate_tokens(&c) <= budget,
                    "chunk over budget {}: {} tokens",
                    budget,
                    estimate_tokens(&c)
                );
            }
        }
    }

    #[test]
    fn test_overlap_dropped_when_it_would_exceed_budget() {
        let a = "alpha ".repeat(60).trim().to_string();
        let b = "beta ".repeat(48).trim().to_string();
        assert_eq!(estimate_tokens(&a), 90);
        assert_eq!(estimate_tokens(&b), 60);

        let chunks = chunk(&format!("{}\n\n{}", a, b), opts(100, 50));
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn test_hard_cut_unbroken_text() {
        let text = "abcdefghij".repeat(300);
        let chunks = chunk(&text, opts(100, 0));
        assert_eq!(chunks.len(), 8);
        assert!(chunks.iter().all(|c| c.chars().count() <= 400));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_every_word_is_covered() {
        let text = format!(
            "# Runbook\n\n{}\n\n1. restart the pods\n2. check the dashboards\n\n{}",
            numbered_paragraph(20),
            numbered_paragraph(7)
        );
        let chunks = chunk(&text, opts(120, 25));
        let joined = chunks.join(" ");
        for word in text.split_whitespace() {
            assert!(joined.contains(word), "missing word {:?}", word);
        }
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn test_chunks_align_on_block_starts() {
        let mut text = String::new();
        for i in 0..8 {
            text.push_str(&format!("# Heading {}\n", i));
            text.push_str(&format!(
                "Paragraph {} explains how the ingestion service batches writes and retries them on failure.\n\n",
                i
            ));
            text.push_str(&format!("- note {} about retries\n\n", i));
        }
        let blocks = split_blocks(&text);
        let chunks = chunk(&text, opts(100, 15));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(
                blocks.iter().any(|b| c.starts_with(b.as_str())),
                "chunk does not start on a block boundary: {:?}",
                c
            );
        }
    }

    #[test]
    fn test_chunk_document_indices_and_hashes() {
        let text = numbered_paragraph(40);
        let c1 = chunk_document("doc1", &text, opts(100, 10));
        let c2 = chunk_document("doc1", &text, opts(100, 10));
        assert!(c1.len() > 1);
        for (i, (a, b)) in c1.iter().zip(c2.iter()).enumerate() {
            assert_eq!(a.chunk_index, i as i64);
            assert_eq!(a.document_id, "doc1");
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_ne!(a.id, b.id);
        }
    }
}
