use unicode_segmentation::UnicodeSegmentation;

use crate::config::ProcessingConfig;

/// Paragraph delimiter the chunker splits on and rejoins with.
pub const PARAGRAPH_DELIMITER: &str = "\n\n";

/// Splits long text into bounded pieces without breaking semantic units
/// harder than necessary: paragraphs first, sentences only when a single
/// paragraph exceeds the budget. A unit that alone exceeds the budget
/// becomes its own oversized chunk. Truncating mid-unit would silently
/// destroy clinical content, so it never happens.
pub struct TextChunker {
    max_chunk_chars: usize,
}

impl TextChunker {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            max_chunk_chars: config.max_chunk_chars,
        }
    }

    pub fn with_max_chars(max_chunk_chars: usize) -> Self {
        Self { max_chunk_chars }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.max_chunk_chars)
    }
}

/// A unit plus the delimiter that followed it in the source, so chunks
/// rejoin with the original separators.
struct Unit<'a> {
    text: &'a str,
    trailing: &'static str,
}

pub fn chunk_text(text: &str, max_chunk_chars: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let units = split_into_units(text, max_chunk_chars);
    merge_units_into_chunks(units, max_chunk_chars)
}

fn split_into_units(text: &str, max_chunk_chars: usize) -> Vec<Unit<'_>> {
    let mut units = Vec::new();

    for paragraph in text.split(PARAGRAPH_DELIMITER) {
        if paragraph.trim().is_empty() {
            continue;
        }

        if paragraph.chars().count() <= max_chunk_chars {
            units.push(Unit {
                text: paragraph,
                trailing: PARAGRAPH_DELIMITER,
            });
            continue;
        }

        // Oversized paragraph: fall back to sentence boundaries. UAX#29
        // sentence segments keep their trailing whitespace, so no
        // in-paragraph delimiter needs re-inserting.
        let sentences: Vec<&str> = paragraph.unicode_sentences().collect();
        let last = sentences.len().saturating_sub(1);
        for (i, sentence) in sentences.into_iter().enumerate() {
            units.push(Unit {
                text: sentence,
                trailing: if i == last { PARAGRAPH_DELIMITER } else { "" },
            });
        }
    }

    units
}

fn merge_units_into_chunks(units: Vec<Unit<'_>>, max_chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&Unit<'_>> = Vec::new();
    let mut current_len = 0usize;

    for unit in &units {
        let unit_len = unit.text.chars().count();
        let joint = current
            .last()
            .map(|prev| prev.trailing.len())
            .unwrap_or(0);

        if !current.is_empty() && current_len + joint + unit_len > max_chunk_chars {
            chunks.push(close_chunk(&current));
            current.clear();
            current_len = 0;
        }

        if current.is_empty() {
            current_len = unit_len;
        } else {
            current_len += joint + unit_len;
        }
        current.push(unit);
    }

    if !current.is_empty() {
        chunks.push(close_chunk(&current));
    }

    chunks
}

fn close_chunk(units: &[&Unit<'_>]) -> String {
    let mut chunk = String::new();
    for (i, unit) in units.iter().enumerate() {
        chunk.push_str(unit.text);
        if i + 1 < units.len() {
            chunk.push_str(unit.trailing);
        }
    }
    chunk.trim_end().to_string()
}
