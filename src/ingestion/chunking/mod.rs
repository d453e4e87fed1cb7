
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 800;

static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("newline pattern is valid"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));
static PAGE_NUMBERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Page \d+ of \d+").expect("page number pattern is valid"));

/// Configuration for splitting cleaned text into chunks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Character threshold a packed chunk stays under
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Normalize extracted document text before sentence splitting.
///
/// Runs of newlines collapse to one, runs of two or more whitespace
/// characters collapse to a single space and `Page N of M` footers are
/// dropped.
#[inline]
pub fn clean_text(text: &str) -> String {
    let text = NEWLINE_RUNS.replace_all(text, "\n");
    let text = WHITESPACE_RUNS.replace_all(&text, " ");
    let text = PAGE_NUMBERS.replace_all(&text, "");
    text.trim().to_string()
}

/// Split text after `.`, `!` or `?` when followed by whitespace
#[inline]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }

        let end = i + c.len_utf8();
        push_sentence(&mut sentences, &text[start..end]);

        // Skip the whitespace run so the next sentence starts on text
        start = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            start = j + w.len_utf8();
            chars.next();
        }
    }

    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() {
        sentences.push(candidate);
    }
}

/// Greedily pack sentences into chunks that stay under `chunk_size` characters.
///
/// A sentence that would push the buffer to the threshold closes the
/// current chunk and starts the next one, so a single oversized sentence
/// becomes a chunk of its own.
#[inline]
pub fn pack_sentences(sentences: &[&str], chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();

        if current_len + sentence_len < chunk_size {
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(sentence);
            current_len += sentence_len;
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Prefix every chunk with its predecessor: `[A, B, C]` becomes `[A, A B, B C]`
#[inline]
pub fn apply_overlap(raw_chunks: &[String]) -> Vec<String> {
    raw_chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| match i.checked_sub(1) {
            Some(prev) => format!("{} {}", raw_chunks[prev], chunk),
            None => chunk.clone(),
        })
        .collect()
}

/// Clean, split, pack and overlap a document's text
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let cleaned = clean_text(text);
    let sentences = split_sentences(&cleaned);
    let raw_chunks = pack_sentences(&sentences, config.chunk_size);
    let chunks = apply_overlap(&raw_chunks);

    debug!(
        "Chunked {} characters into {} sentences and {} chunks",
        cleaned.len(),
        sentences.len(),
        chunks.len()
    );

    chunks
}
