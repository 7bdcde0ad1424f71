use serde_json::json;

use crate::document::Document;

/// Approximate bytes per token for mixed Korean/English text
const CHARS_PER_TOKEN: usize = 4;

/// Text chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text
    pub text: String,

    /// Start byte offset in original text
    pub start: usize,

    /// End byte offset in original text
    pub end: usize,
}

/// Split text into chunks by token count (approximate)
///
/// Chunk edges always fall on UTF-8 character boundaries and prefer sentence
/// endings. Consecutive chunks share roughly `overlap` tokens.
pub fn chunk_text(text: &str, max_tokens: usize, overlap: usize) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = overlap * CHARS_PER_TOKEN;
    let text_len = text.len();

    if text_len <= max_chars {
        return vec![TextChunk {
            text: text.to_string(),
            start: 0,
            end: text_len,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text_len {
        let mut end = floor_boundary(text, start + max_chars);
        if end <= start {
            end = ceil_boundary(text, start + 1);
        }

        let actual_end = if end < text_len {
            find_break_point(text, start, end)
        } else {
            end
        };

        chunks.push(TextChunk {
            text: text[start..actual_end].to_string(),
            start,
            end: actual_end,
        });

        if actual_end >= text_len {
            break;
        }

        // Step back for overlap, but always move forward
        let next = floor_boundary(text, actual_end.saturating_sub(overlap_chars));
        start = if next > start { next } else { actual_end };
    }

    chunks
}

/// Find a good breaking point (sentence boundary) in the last 20% of a chunk
fn find_break_point(text: &str, start: usize, ideal_end: usize) -> usize {
    let search_start = ceil_boundary(text, start + ((ideal_end - start) * 80 / 100));
    if search_start >= ideal_end {
        return ideal_end;
    }
    let search_text = &text[search_start..ideal_end];

    let sentence_endings = [". ", ".\n", "! ", "!\n", "? ", "?\n", "。", "！", "？"];

    sentence_endings
        .iter()
        .filter_map(|ending| search_text.rfind(ending).map(|idx| search_start + idx + ending.len()))
        .max()
        .unwrap_or(ideal_end)
}

fn floor_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Split text by paragraphs
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Chunk a text into ordered documents ready for a refine run
///
/// Leading and trailing whitespace is left out of the chunks. Each document
/// carries `source`, `chunk_index`, `start` and `end` metadata, the offsets
/// being byte positions in `text` itself.
pub fn split_into_documents(text: &str, source: &str, max_tokens: usize, overlap: usize) -> Vec<Document> {
    let leading = text.len() - text.trim_start().len();

    chunk_text(text.trim(), max_tokens, overlap)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| Document {
            page_content: chunk.text,
            metadata: [
                ("source".to_string(), json!(source)),
                ("chunk_index".to_string(), json!(index)),
                ("start".to_string(), json!(leading + chunk.start)),
                ("end".to_string(), json!(leading + chunk.end)),
            ]
            .into_iter()
            .collect(),
        })
        .collect()
}
