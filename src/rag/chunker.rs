// Markdown-aware document chunking
//
// Documents are first cut at markdown headers (levels 1-4), then each
// section is windowed into chunks of at most `chunk_size` characters.
// Window ends prefer paragraph breaks, then line breaks, then spaces.
// Consecutive chunks share up to `chunk_overlap` characters.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{DocError, Result};
use crate::types::Span;

/// Break points, strongest first
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Deepest header level that starts a new section
const MAX_HEADER_LEVEL: usize = 4;

/// Chunking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Piece of a document produced by the chunker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPiece {
    pub span: Span,
    pub text: String,
}

/// Splits documents into overlapping, span-addressed pieces
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(DocError::Config("chunk_size must be greater than 0".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(DocError::Config(
                "chunk_overlap must be less than chunk_size".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split a document into pieces, in document order
    pub fn split(&self, document: &str) -> Vec<TextPiece> {
        let chars: Vec<char> = document.chars().collect();
        let mut pieces = Vec::new();

        for (start, end) in markdown_sections(&chars) {
            self.split_section(&chars, start, end, &mut pieces);
        }

        pieces
    }

    fn split_section(&self, chars: &[char], start: usize, end: usize, out: &mut Vec<TextPiece>) {
        let mut cursor = start;

        while cursor < end {
            let window_end = (cursor + self.config.chunk_size).min(end);
            let cut = if window_end == end {
                end
            } else {
                self.find_break(chars, cursor, window_end)
            };

            push_trimmed(chars, cursor, cut, out);

            if cut >= end {
                break;
            }

            // cut > cursor + overlap, so the next window always moves forward
            let next = cut.saturating_sub(self.config.chunk_overlap).max(cursor + 1);
            cursor = align_to_word(chars, next, cut);
        }
    }

    /// Last separator inside the window that still leaves room for overlap
    fn find_break(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let min_cut = start + self.config.chunk_overlap + 1;

        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let lower = min_cut.max(start + sep.len());
            let mut i = window_end;
            while i >= lower {
                if chars[i - sep.len()..i] == sep[..] {
                    return i;
                }
                i -= 1;
            }
        }

        window_end
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

/// Stable document id: first 16 hex chars of the SHA-256 of the text
pub fn document_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// Section boundaries (char offsets) split at markdown headers
fn markdown_sections(chars: &[char]) -> Vec<(usize, usize)> {
    let mut starts = vec![0];

    for (i, c) in chars.iter().enumerate() {
        let line_start = i + 1;
        if *c == '\n' && line_start < chars.len() && is_header(&chars[line_start..]) {
            starts.push(line_start);
        }
    }

    let mut sections = Vec::with_capacity(starts.len());
    for (idx, start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(chars.len());
        if chars[*start..end].iter().any(|c| !c.is_whitespace()) {
            sections.push((*start, end));
        }
    }
    sections
}

/// `#` to `####` followed by a space, after optional indentation
fn is_header(line: &[char]) -> bool {
    let trimmed: Vec<char> = line
        .iter()
        .copied()
        .skip_while(|c| *c == ' ' || *c == '\t')
        .take(MAX_HEADER_LEVEL + 1)
        .collect();
    let hashes = trimmed.iter().take_while(|c| **c == '#').count();
    (1..=MAX_HEADER_LEVEL).contains(&hashes) && trimmed.get(hashes) == Some(&' ')
}

/// Move a window start past a partial word, if a space is in reach
fn align_to_word(chars: &[char], start: usize, limit: usize) -> usize {
    if start == 0 || chars[start - 1].is_whitespace() {
        return start;
    }
    match chars[start..limit].iter().position(|c| c.is_whitespace()) {
        Some(offset) if start + offset + 1 < limit => start + offset + 1,
        _ => start,
    }
}

fn push_trimmed(chars: &[char], start: usize, end: usize, out: &mut Vec<TextPiece>) {
    let mut a = start;
    let mut b = end;
    while a < b && chars[a].is_whitespace() {
        a += 1;
    }
    while b > a && chars[b - 1].is_whitespace() {
        b -= 1;
    }
    if a < b {
        out.push(TextPiece {
            span: Span::new(a, b),
            text: chars[a..b].iter().collect(),
        });
    }
}
