use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leptess::LepTess;
use tokio::sync::Mutex;

use crate::config::OcrConfig;
use crate::error::{MedsumError, Result};
use crate::models::OcrOutcome;
use crate::processing::decode::Page;

use super::engine::{EngineKind, EngineTier, OcrEngine};

/// Local Tesseract engine. The LepTess handle is not Sync, so it lives
/// behind a mutex and runs on the blocking pool.
pub struct TesseractEngine {
    tesseract: Arc<Mutex<LepTess>>,
    languages: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let tesseract = LepTess::new(None, &config.languages)
            .map_err(|e| MedsumError::OcrUnavailable(format!("Tesseract init failed: {e}")))?;

        Ok(Self {
            tesseract: Arc::new(Mutex::new(tesseract)),
            languages: config.languages.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn run_ocr(&self, bytes: Vec<u8>, language_hint: Option<String>) -> Result<String> {
        let shared = Arc::clone(&self.tesseract);
        let configured = self.languages.clone();

        let text = tokio::task::spawn_blocking(move || {
            // A hint differing from the configured languages gets its own
            // short-lived instance; the shared handle keeps its setup.
            match language_hint.filter(|hint| *hint != configured) {
                Some(hint) => {
                    let mut lt = LepTess::new(None, &hint)
                        .map_err(|e| MedsumError::Ocr(format!("Tesseract init failed: {e}")))?;
                    recognize_bytes(&mut lt, &bytes)
                }
                None => {
                    let mut lt = shared.blocking_lock();
                    recognize_bytes(&mut lt, &bytes)
                }
            }
        })
        .await
        .map_err(|e| MedsumError::Ocr(format!("OCR task panicked: {e}")))??;

        Ok(text.trim().to_string())
    }
}

fn recognize_bytes(lt: &mut LepTess, bytes: &[u8]) -> Result<String> {
    lt.set_image_from_mem(bytes)
        .map_err(|e| MedsumError::Ocr(format!("Failed to set image: {e}")))?;
    lt.get_utf8_text()
        .map_err(|e| MedsumError::Ocr(format!("Failed to extract text: {e}")))
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn id(&self) -> &'static str {
        "tesseract"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::GeneralPurpose
    }

    fn tier(&self) -> EngineTier {
        EngineTier::Primary
    }

    async fn recognize(&self, page: &Page, language_hint: Option<&str>) -> OcrOutcome {
        let hint = language_hint.map(String::from);
        let result =
            tokio::time::timeout(self.timeout, self.run_ocr(page.png.clone(), hint)).await;

        match result {
            Ok(Ok(text)) => OcrOutcome::success(self.id(), text, None),
            Ok(Err(e)) => OcrOutcome::failure(self.id(), e.to_string()),
            Err(_) => OcrOutcome::failure(
                self.id(),
                format!("OCR timed out after {} seconds", self.timeout.as_secs()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OcrConfig {
        OcrConfig {
            engines: vec!["tesseract".to_string()],
            languages: "eng".to_string(),
            timeout_secs: 30,
            max_image_dimension: 4096,
            min_image_dimension: 50,
        }
    }

    #[test]
    fn test_engine_metadata() {
        // Construction may fail on hosts without Tesseract installed;
        // only the metadata is under test here.
        if let Ok(engine) = TesseractEngine::new(&test_config()) {
            assert_eq!(engine.id(), "tesseract");
            assert_eq!(engine.kind(), EngineKind::GeneralPurpose);
            assert_eq!(engine.tier(), EngineTier::Primary);
        }
    }

    #[tokio::test]
    async fn test_blank_image_does_not_error_past_boundary() {
        let Ok(engine) = TesseractEngine::new(&test_config()) else {
            return;
        };

        let img = image::DynamicImage::new_luma8(200, 200);
        let mut png = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )
        .unwrap();

        let outcome = engine
            .recognize(&Page { number: 1, png }, None)
            .await;
        // Blank page: success with empty text, or a captured failure.
        // Either way, no panic and no propagated error.
        if outcome.succeeded {
            assert!(outcome.text.trim().is_empty());
        } else {
            assert!(outcome.error.is_some());
        }
    }
}
