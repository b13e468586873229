//! Text chunking with configurable size, overlap, and strategy
//!
//! Pure functions: no job state, no IO. Offsets are positions in the
//! concatenation of emitted chunks (chunk boundaries may overlap), measured
//! in bytes of the UTF-8 text.

use serde::{Deserialize, Serialize};

/// Separator priority for the recursive strategy: paragraph break, line
/// break, sentence punctuation, clause punctuation, then plain spaces.
const RECURSIVE_SEPARATORS: [&str; 8] = ["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "];

/// How the chunker splits input text
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Accumulate sentences into fixed-size chunks with overlap
    #[default]
    Fixed,
    /// Recursively split by paragraphs, lines, sentences, then words
    Recursive,
}

/// One retrieval chunk with its position in the emitted sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based emission index
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Start offset in the concatenation of emitted chunks (inclusive)
    pub start_char: usize,
    /// End offset in the concatenation of emitted chunks (exclusive)
    pub end_char: usize,
}

/// Split `text` into chunks of roughly `chunk_size` characters with
/// `chunk_overlap` characters carried between adjacent chunks.
pub fn split(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkingStrategy,
) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let raw = match strategy {
        ChunkingStrategy::Recursive => {
            recursive_split(text, chunk_size, chunk_overlap, &RECURSIVE_SEPARATORS)
        }
        ChunkingStrategy::Fixed => fixed_split(text, chunk_size, chunk_overlap),
    };

    let mut pos = 0usize;
    raw.into_iter()
        .enumerate()
        .map(|(index, text)| {
            let start_char = pos;
            pos += text.len();
            TextChunk {
                index,
                text,
                start_char,
                end_char: pos,
            }
        })
        .collect()
}

/// Sentence-accumulating split: greedily pack sentences until the next one
/// would overflow `chunk_size`, then emit and carry the overlap tail.
fn fixed_split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if !current.is_empty() && current.len() + sentence.len() > chunk_size {
            chunks.push(current.trim().to_string());
            if chunk_overlap > 0 && current.len() > chunk_overlap {
                let tail = overlap_tail(&current, chunk_overlap).to_string();
                current = format!("{} {}", tail, sentence);
            } else {
                current = sentence.to_string();
            }
        } else if current.is_empty() {
            current = sentence.to_string();
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }

    chunks
}

/// Recursive split: break on the highest-priority separator, greedily
/// re-accumulate parts with overlap carry, and re-split any oversized
/// result with the remaining separators. When separators run out, an
/// oversized chunk is emitted as-is.
fn recursive_split(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((sep, remaining)) = separators.split_first() else {
        return vec![text.to_string()];
    };

    let mut results = Vec::new();
    let mut current = String::new();

    for part in text.split(sep) {
        let candidate_len = if current.is_empty() {
            part.len()
        } else {
            current.len() + sep.len() + part.len()
        };

        if candidate_len > chunk_size && !current.is_empty() {
            results.push(current.clone());
            if chunk_overlap > 0 && current.len() > chunk_overlap {
                current = format!("{}{}{}", overlap_tail(&current, chunk_overlap), sep, part);
            } else {
                current = part.to_string();
            }
        } else if current.is_empty() {
            current = part.to_string();
        } else {
            current.push_str(sep);
            current.push_str(part);
        }
    }

    if !current.is_empty() {
        results.push(current);
    }

    if remaining.is_empty() {
        return results;
    }

    results
        .into_iter()
        .flat_map(|chunk| {
            if chunk.len() > chunk_size {
                recursive_split(&chunk, chunk_size, chunk_overlap, remaining)
            } else {
                vec![chunk]
            }
        })
        .collect()
}

/// Split on sentence boundaries: a `.`, `!`, or `?` followed by whitespace.
/// The boundary whitespace is consumed; empty sentences are dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev_terminal = false;

    for (i, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i + ch.len_utf8();
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }

    let last = text[start..].trim();
    if !last.is_empty() {
        sentences.push(last);
    }

    sentences
}

/// Last `overlap` bytes of `text`, snapped back to a char boundary.
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if text.len() <= overlap {
        return text;
    }
    let mut start = text.len() - overlap;
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    &text[start..]
}
