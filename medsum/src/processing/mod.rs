pub mod chunker;
pub mod decode;
pub mod language;
pub mod pipeline;

pub use chunker::{chunk_text, TextChunker, PARAGRAPH_DELIMITER};
pub use decode::{decode_document, Page};
pub use language::detect_language;
pub use pipeline::Pipeline;
