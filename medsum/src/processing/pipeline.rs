use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::MedsumError;
use crate::llm::LlmProvider;
use crate::models::{
    BatchReport, DocumentReport, PageReport, ProcessOptions, Stage, SummaryReport,
};
use crate::ocr::{build_engines, select_engines, OcrEngine, Reconciler};
use crate::summarizer::{Summarizer, SummaryOptions};

use super::decode::decode_document;

/// The whole document pipeline, constructed once at startup and shared:
/// decode into pages, reconcile OCR per page, assemble the text, then
/// drive the chunked summarizer. Each invocation is independent; there
/// is no shared mutable state.
pub struct Pipeline {
    engines: Vec<Arc<dyn OcrEngine>>,
    reconciler: Reconciler,
    summarizer: Summarizer,
    ocr_config: crate::config::OcrConfig,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        let engines = build_engines(config);
        Self::with_engines(config, engines)
    }

    /// Construct with an explicit engine set (tests, embedders).
    pub fn with_engines(config: &Config, engines: Vec<Arc<dyn OcrEngine>>) -> Self {
        if engines.is_empty() {
            warn!("No OCR engines available - documents will fail at the OCR stage");
        }

        let llm = LlmProvider::new(config.llm.as_ref());
        if !llm.is_available() {
            warn!("LLM unavailable - summarization will fail until LLM_MODEL is set");
        }

        Self {
            engines,
            reconciler: Reconciler::new(config.reconciler.clone()),
            summarizer: Summarizer::new(llm, config.llm.as_ref(), &config.processing),
            ocr_config: config.ocr.clone(),
        }
    }

    /// Process one document end to end:
    /// decode → per-page OCR reconciliation → chunked summarization.
    pub async fn process(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ProcessOptions,
        cancel: Option<&CancellationToken>,
    ) -> DocumentReport {
        let (mut report, text) = self.extract_text(bytes, filename, options).await;

        let Some(text) = text else {
            return report;
        };

        report.stage = Stage::Summarizing;
        match self.summarize_text(&text, options, cancel).await {
            Ok(summary) => {
                report.stage = Stage::Done;
                report.summary = Some(summary);
            }
            Err(e) => {
                report.success = false;
                report.error = Some(e.to_string());
            }
        }

        report
    }

    /// Process several documents as one case file: each document is
    /// OCRed independently (one bad scan never sinks the batch), the
    /// texts are concatenated, and a single summary covers them all.
    pub async fn process_many(
        &self,
        documents: &[(Vec<u8>, String)],
        options: &ProcessOptions,
        cancel: Option<&CancellationToken>,
    ) -> BatchReport {
        let mut reports = Vec::with_capacity(documents.len());
        let mut texts: Vec<String> = Vec::new();

        for (bytes, filename) in documents {
            let (report, text) = self.extract_text(bytes, filename, options).await;
            if let Some(text) = text {
                texts.push(text);
            }
            reports.push(report);
        }

        if texts.is_empty() {
            return BatchReport {
                documents: reports,
                summary: None,
                success: false,
            };
        }

        let combined = texts.join("\n\n");
        match self.summarize_text(&combined, options, cancel).await {
            Ok(summary) => BatchReport {
                documents: reports,
                summary: Some(summary),
                success: true,
            },
            Err(e) => {
                warn!(error = %e, "batch summarization failed");
                BatchReport {
                    documents: reports,
                    summary: None,
                    success: false,
                }
            }
        }
    }

    /// Decode and OCR one document. Returns the report (terminal on
    /// failure) plus the assembled text when at least one page produced
    /// something.
    async fn extract_text(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ProcessOptions,
    ) -> (DocumentReport, Option<String>) {
        info!(filename, size = bytes.len(), "document received");

        let pages = match decode_document(bytes, filename, &self.ocr_config) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(filename, error = %e, "document decode failed");
                return (
                    DocumentReport::failed(filename, Stage::Decoded, e.to_string()),
                    None,
                );
            }
        };

        let engines = select_engines(&self.engines, options.engines.as_deref());
        let language_hint = options.language_hint.as_deref();

        let mut page_reports: Vec<PageReport> = Vec::with_capacity(pages.len());
        for page in &pages {
            let report = self
                .reconciler
                .reconcile_page(page, &engines, language_hint)
                .await;
            page_reports.push(report);
        }

        if page_reports.iter().all(|p| !p.succeeded) {
            let detail = page_reports
                .iter()
                .flat_map(|p| p.failures.iter())
                .map(|f| format!("{}: {}", f.engine, f.error))
                .collect::<Vec<_>>()
                .join("; ");

            warn!(filename, "OCR failed on every page");
            let mut report = DocumentReport::failed(
                filename,
                Stage::OcrReconciled,
                format!("All OCR engines failed: {detail}"),
            );
            report.pages = page_reports;
            return (report, None);
        }

        let text = assemble_text(&page_reports);
        info!(
            filename,
            pages = page_reports.len(),
            chars = text.chars().count(),
            "OCR reconciled"
        );

        let report = DocumentReport {
            filename: filename.to_string(),
            success: true,
            stage: Stage::OcrReconciled,
            pages: page_reports,
            text: Some(text.clone()),
            summary: None,
            error: None,
            processed_at: Utc::now(),
        };

        (report, Some(text))
    }

    async fn summarize_text(
        &self,
        text: &str,
        options: &ProcessOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<SummaryReport, MedsumError> {
        let summary_options = SummaryOptions {
            instruction: options.instruction_prompt.clone(),
            max_chunk_chars: options.max_chunk_chars,
            max_tokens: options.max_tokens,
        };

        self.summarizer
            .summarize(text, &summary_options, cancel)
            .await
    }
}

/// Join per-page texts. Multi-page documents get page headers so the
/// summary can reference where a finding came from; single pages stay
/// unadorned. Failed and empty pages are skipped here; their failures
/// and no-text markers stay on the page report.
fn assemble_text(pages: &[PageReport]) -> String {
    let extracted: Vec<(usize, &str)> = pages
        .iter()
        .filter(|p| p.succeeded && !p.text.no_text_detected)
        .map(|p| (p.number, p.text.text.as_str()))
        .collect();

    if extracted.len() == 1 {
        return extracted[0].1.to_string();
    }

    extracted
        .iter()
        .map(|(number, text)| format!("--- Page {number} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectedLanguage, EngineFailure, ReconciledText};

    fn page_report(number: usize, text: Option<&str>) -> PageReport {
        PageReport {
            number,
            text: match text {
                Some(t) => ReconciledText {
                    text: t.to_string(),
                    language: DetectedLanguage::En,
                    provenance: vec!["tesseract".to_string()],
                    confidence: None,
                    no_text_detected: false,
                },
                None => ReconciledText::no_text(),
            },
            succeeded: text.is_some(),
            failures: if text.is_none() {
                vec![EngineFailure {
                    engine: "tesseract".to_string(),
                    error: "boom".to_string(),
                }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn test_assemble_single_page_has_no_header() {
        let text = assemble_text(&[page_report(1, Some("only page"))]);
        assert_eq!(text, "only page");
    }

    #[test]
    fn test_assemble_multi_page_adds_headers() {
        let text = assemble_text(&[
            page_report(1, Some("first")),
            page_report(2, Some("second")),
        ]);
        assert_eq!(text, "--- Page 1 ---\nfirst\n\n--- Page 2 ---\nsecond");
    }

    #[test]
    fn test_assemble_skips_failed_pages() {
        let text = assemble_text(&[
            page_report(1, Some("first")),
            page_report(2, None),
            page_report(3, Some("third")),
        ]);
        assert_eq!(text, "--- Page 1 ---\nfirst\n\n--- Page 3 ---\nthird");
    }

    #[tokio::test]
    async fn test_decode_failure_yields_failed_report() {
        let mut config = Config::default();
        config.ocr.engines = Vec::new();
        let pipeline = Pipeline::with_engines(&config, Vec::new());

        let report = pipeline
            .process(&[1, 2, 3], "broken.png", &ProcessOptions::default(), None)
            .await;

        assert!(!report.success);
        assert_eq!(report.stage, Stage::Decoded);
        assert!(report.error.is_some());
        assert!(report.summary.is_none());
    }
}
