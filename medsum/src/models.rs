use chrono::{DateTime, Utc};
use serde::Serialize;

/// Marker used in place of text when every engine came back empty.
/// An empty page is information, not a fault, so it is never reported
/// as a bare empty string.
pub const NO_TEXT_DETECTED: &str = "[no text detected]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedLanguage {
    He,
    En,
    Unknown,
}

/// One engine invocation for one page. Immutable once produced; adapters
/// return this instead of erroring past their boundary.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOutcome {
    pub engine: String,
    pub text: String,
    pub language: DetectedLanguage,
    pub confidence: Option<f32>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl OcrOutcome {
    pub fn success(engine: &str, text: String, confidence: Option<f32>) -> Self {
        Self {
            engine: engine.to_string(),
            text,
            language: DetectedLanguage::Unknown,
            confidence,
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(engine: &str, error: String) -> Self {
        Self {
            engine: engine.to_string(),
            text: String::new(),
            language: DetectedLanguage::Unknown,
            confidence: None,
            succeeded: false,
            error: Some(error),
        }
    }

    /// Length in non-whitespace characters, the unit the reconciliation
    /// thresholds are expressed in.
    pub fn non_whitespace_len(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineFailure {
    pub engine: String,
    pub error: String,
}

/// The reconciler's output for one page: the chosen or merged text plus
/// which engine(s) contributed it.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledText {
    pub text: String,
    pub language: DetectedLanguage,
    pub provenance: Vec<String>,
    pub confidence: Option<f32>,
    pub no_text_detected: bool,
}

impl ReconciledText {
    pub fn no_text() -> Self {
        Self {
            text: NO_TEXT_DETECTED.to_string(),
            language: DetectedLanguage::Unknown,
            provenance: Vec::new(),
            confidence: None,
            no_text_detected: true,
        }
    }
}

/// Per-page reconciliation result. `succeeded` is false only when every
/// invoked engine failed; the page then carries the no-text marker plus
/// the per-engine errors. Degraded engines leave their errors in
/// `failures` alongside a successful reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub number: usize,
    pub text: ReconciledText,
    pub succeeded: bool,
    pub failures: Vec<EngineFailure>,
}

/// Pipeline stages for one document. A failed report carries the stage
/// that failed; a successful one ends at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Decoded,
    OcrRunning,
    OcrReconciled,
    Chunked,
    Summarizing,
    Summarized,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub summary: String,
    pub chunk_count: usize,
    pub partial: bool,
    /// 1-indexed chunks whose generation failed or was cancelled.
    pub omitted_chunks: Vec<usize>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub filename: String,
    pub success: bool,
    pub stage: Stage,
    pub pages: Vec<PageReport>,
    pub text: Option<String>,
    pub summary: Option<SummaryReport>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl DocumentReport {
    pub fn failed(filename: &str, stage: Stage, error: String) -> Self {
        Self {
            filename: filename.to_string(),
            success: false,
            stage,
            pages: Vec::new(),
            text: None,
            summary: None,
            error: Some(error),
            processed_at: Utc::now(),
        }
    }
}

/// Batch mode: per-document OCR reports plus one summary over the
/// concatenated texts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub summary: Option<SummaryReport>,
    pub success: bool,
}

/// Caller-supplied overrides for one pipeline invocation. Anything left
/// unset falls back to the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Engine ids to use, in order. `None` uses every configured engine.
    pub engines: Option<Vec<String>>,
    pub language_hint: Option<String>,
    pub instruction_prompt: Option<String>,
    pub max_chunk_chars: Option<usize>,
    pub max_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_whitespace_len_ignores_whitespace() {
        let outcome = OcrOutcome::success("tesseract", "  a b\nc  ".to_string(), None);
        assert_eq!(outcome.non_whitespace_len(), 3);
    }

    #[test]
    fn test_failure_outcome_has_no_text() {
        let outcome = OcrOutcome::failure("dicta", "timeout".to_string());
        assert!(!outcome.succeeded);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert!(outcome.confidence.is_none());
    }

    #[test]
    fn test_no_text_marker_is_explicit() {
        let reconciled = ReconciledText::no_text();
        assert!(reconciled.no_text_detected);
        assert_eq!(reconciled.text, NO_TEXT_DETECTED);
        assert!(reconciled.provenance.is_empty());
    }
}
