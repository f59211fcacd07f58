use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::config::ReconcilerConfig;
use crate::models::{
    DetectedLanguage, EngineFailure, OcrOutcome, PageReport, ReconciledText,
};
use crate::processing::decode::Page;
use crate::processing::language::detect_language;

use super::engine::{EngineKind, EngineTier, OcrEngine};

/// Combines competing engine outputs into one best-effort text per page.
///
/// Mixed-language pages are the whole reason this exists: the Hebrew
/// specialist misses English sections and the general engines mangle
/// Hebrew, so when both come back with real text the two are
/// concatenated rather than ranked.
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Run the configured engines for one page and apply the selection
    /// policy. Individual engine failures degrade; only a page where
    /// every engine failed comes back without text.
    pub async fn reconcile_page(
        &self,
        page: &Page,
        engines: &[Arc<dyn OcrEngine>],
        language_hint: Option<&str>,
    ) -> PageReport {
        if engines.is_empty() {
            return PageReport {
                number: page.number,
                text: ReconciledText::no_text(),
                succeeded: false,
                failures: vec![EngineFailure {
                    engine: "none".to_string(),
                    error: "No OCR engines configured".to_string(),
                }],
            };
        }

        let primaries: Vec<&Arc<dyn OcrEngine>> = engines
            .iter()
            .filter(|e| e.tier() == EngineTier::Primary)
            .collect();
        let secondaries: Vec<&Arc<dyn OcrEngine>> = engines
            .iter()
            .filter(|e| e.tier() == EngineTier::Secondary)
            .collect();

        // When only secondaries are selected they act as the first wave.
        let first_wave = if primaries.is_empty() {
            &secondaries
        } else {
            &primaries
        };

        let mut outcomes = run_engines(first_wave, page, language_hint).await;

        // Escalate to the paid/slow tier only when the first wave came
        // back thin.
        if !primaries.is_empty() && !secondaries.is_empty() {
            let best = outcomes
                .iter()
                .filter(|(_, o)| o.succeeded)
                .map(|(_, o)| o.non_whitespace_len())
                .max()
                .unwrap_or(0);

            if best < self.config.escalation_threshold {
                info!(
                    page = page.number,
                    best_len = best,
                    threshold = self.config.escalation_threshold,
                    "primary OCR below threshold, escalating to secondary engines"
                );
                outcomes.extend(run_engines(&secondaries, page, language_hint).await);
            }
        }

        for (_, outcome) in outcomes.iter_mut() {
            if outcome.succeeded {
                outcome.language = detect_language(&outcome.text);
            }
        }

        let failures: Vec<EngineFailure> = outcomes
            .iter()
            .filter(|(_, o)| !o.succeeded)
            .map(|(_, o)| EngineFailure {
                engine: o.engine.clone(),
                error: o.error.clone().unwrap_or_else(|| "unknown error".into()),
            })
            .collect();

        // Total failure still yields the no-text marker rather than a
        // fault; the caller sees it as a failed page via `succeeded`.
        if outcomes.iter().all(|(_, o)| !o.succeeded) {
            return PageReport {
                number: page.number,
                text: ReconciledText::no_text(),
                succeeded: false,
                failures,
            };
        }

        let reconciled = self.select(&outcomes);
        debug!(
            page = page.number,
            provenance = ?reconciled.provenance,
            language = ?reconciled.language,
            no_text = reconciled.no_text_detected,
            "page reconciled"
        );

        PageReport {
            number: page.number,
            text: reconciled,
            succeeded: true,
            failures,
        }
    }

    /// The selection table. Deterministic over the completed outcome set.
    fn select(&self, outcomes: &[(EngineKind, OcrOutcome)]) -> ReconciledText {
        let min = self.config.min_text_chars;

        let hebrew = outcomes
            .iter()
            .filter(|(kind, o)| {
                *kind == EngineKind::HebrewSpecialized && o.succeeded && o.non_whitespace_len() > min
            })
            .max_by_key(|(_, o)| o.non_whitespace_len());

        let general = outcomes
            .iter()
            .filter(|(kind, o)| {
                *kind == EngineKind::GeneralPurpose
                    && o.succeeded
                    && o.language == DetectedLanguage::En
                    && o.non_whitespace_len() > min
            })
            .max_by_key(|(_, o)| o.non_whitespace_len());

        match (hebrew, general) {
            // Both sides saw real text: the page is mixed-language, keep both.
            (Some((_, heb)), Some((_, gen))) => ReconciledText {
                text: format!("{}\n\n{}", heb.text.trim(), gen.text.trim()),
                language: DetectedLanguage::He,
                provenance: vec![heb.engine.clone(), gen.engine.clone()],
                // No meaningful aggregate confidence exists for a merge.
                confidence: None,
                no_text_detected: false,
            },
            (Some((_, heb)), None) => ReconciledText {
                text: heb.text.trim().to_string(),
                language: DetectedLanguage::He,
                provenance: vec![heb.engine.clone()],
                confidence: heb.confidence,
                no_text_detected: false,
            },
            (None, Some((_, gen))) => ReconciledText {
                text: gen.text.trim().to_string(),
                language: gen.language,
                provenance: vec![gen.engine.clone()],
                confidence: gen.confidence,
                no_text_detected: false,
            },
            // Nothing cleared the threshold: longest successful output wins.
            (None, None) => {
                let longest = outcomes
                    .iter()
                    .filter(|(_, o)| o.succeeded)
                    .max_by_key(|(_, o)| o.text.trim().chars().count());

                match longest {
                    Some((_, o)) if !o.text.trim().is_empty() => ReconciledText {
                        text: o.text.trim().to_string(),
                        language: o.language,
                        provenance: vec![o.engine.clone()],
                        confidence: o.confidence,
                        no_text_detected: false,
                    },
                    _ => ReconciledText::no_text(),
                }
            }
        }
    }
}

/// Invoke a set of engines concurrently. Each adapter enforces its own
/// timeout, so one hanging backend cannot stall the others.
async fn run_engines(
    engines: &[&Arc<dyn OcrEngine>],
    page: &Page,
    language_hint: Option<&str>,
) -> Vec<(EngineKind, OcrOutcome)> {
    let futures = engines
        .iter()
        .map(|engine| engine.recognize(page, language_hint));
    let outcomes = join_all(futures).await;

    engines
        .iter()
        .map(|engine| engine.kind())
        .zip(outcomes)
        .collect()
}
