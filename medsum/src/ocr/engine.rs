use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::OcrOutcome;
use crate::processing::decode::Page;

use super::api::{AbbyyEngine, DictaEngine};
use super::tesseract::TesseractEngine;
use super::vision::VisionEngine;

/// Whether an engine is tuned for Hebrew text or a general-purpose
/// recognizer. The reconciliation policy treats the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    HebrewSpecialized,
    GeneralPurpose,
}

/// Primary engines run on every page. Secondary engines (paid or slow)
/// run only when the primaries come back thin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTier {
    Primary,
    Secondary,
}

/// Uniform capability over every OCR backend.
///
/// `recognize` must not fail past this boundary: transport, auth, and
/// decode problems all come back as `succeeded = false` outcomes so one
/// engine's trouble never takes down a page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn id(&self) -> &'static str;
    fn kind(&self) -> EngineKind;
    fn tier(&self) -> EngineTier;
    async fn recognize(&self, page: &Page, language_hint: Option<&str>) -> OcrOutcome;
}

/// Build the configured engines, skipping (with a warning) any that are
/// missing configuration or whose backend is unavailable. An engine
/// failing to construct never fails startup.
pub fn build_engines(config: &Config) -> Vec<Arc<dyn OcrEngine>> {
    let mut engines: Vec<Arc<dyn OcrEngine>> = Vec::new();

    for name in &config.ocr.engines {
        match name.as_str() {
            "tesseract" => match TesseractEngine::new(&config.ocr) {
                Ok(engine) => {
                    info!(languages = %config.ocr.languages, "Tesseract OCR engine initialized");
                    engines.push(Arc::new(engine));
                }
                Err(e) => warn!("Tesseract engine unavailable, skipping: {e}"),
            },
            "dicta" => match DictaEngine::new(&config.dicta) {
                Ok(engine) => {
                    info!(base_url = %config.dicta.base_url, "Dicta OCR engine initialized");
                    engines.push(Arc::new(engine));
                }
                Err(e) => warn!("Dicta engine unavailable, skipping: {e}"),
            },
            "abbyy" => match &config.abbyy {
                Some(abbyy_config) => match AbbyyEngine::new(abbyy_config) {
                    Ok(engine) => {
                        info!(base_url = %abbyy_config.base_url, "ABBYY OCR engine initialized");
                        engines.push(Arc::new(engine));
                    }
                    Err(e) => warn!("ABBYY engine unavailable, skipping: {e}"),
                },
                None => warn!("ABBYY engine requested but ABBYY_BASE_URL is not set, skipping"),
            },
            "vision" => match &config.vision {
                Some(vision_config) => match VisionEngine::new(vision_config) {
                    Ok(engine) => {
                        info!(bucket = %vision_config.bucket, "Cloud Vision OCR engine initialized");
                        engines.push(Arc::new(engine));
                    }
                    Err(e) => warn!("Cloud Vision engine unavailable, skipping: {e}"),
                },
                None => warn!(
                    "Cloud Vision engine requested but VISION_ACCESS_TOKEN/GCS_BUCKET_NAME are not set, skipping"
                ),
            },
            other => warn!("Unknown OCR engine '{other}', skipping"),
        }
    }

    engines
}

/// Restrict and reorder the registry to the caller's selection. Unknown
/// ids are skipped with a warning; `None` keeps the full registry.
pub fn select_engines(
    engines: &[Arc<dyn OcrEngine>],
    selection: Option<&[String]>,
) -> Vec<Arc<dyn OcrEngine>> {
    let Some(selection) = selection else {
        return engines.to_vec();
    };

    let mut selected = Vec::new();
    for name in selection {
        match engines.iter().find(|e| e.id() == name) {
            Some(engine) => selected.push(Arc::clone(engine)),
            None => warn!("Requested OCR engine '{name}' is not available, skipping"),
        }
    }
    selected
}
