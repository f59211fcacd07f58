//! OCR engines and the reconciliation policy that combines them.
//!
//! Four backends hide behind one `OcrEngine` capability:
//! - `TesseractEngine`: local recognition via leptess
//! - `DictaEngine`: remote Hebrew-specialized service
//! - `AbbyyEngine`: commercial gateway, the only backend with a
//!   structured confidence score
//! - `VisionEngine`: cloud document OCR staged through blob storage
//!
//! The `Reconciler` invokes the configured engines per page and applies
//! a fixed selection/merge policy tuned for mixed Hebrew/English
//! medical scans.

mod api;
mod engine;
mod preprocessing;
mod reconciler;
mod tesseract;
mod vision;

pub use api::{AbbyyEngine, DictaEngine};
pub use engine::{build_engines, select_engines, EngineKind, EngineTier, OcrEngine};
pub use preprocessing::preprocess_image;
pub use reconciler::Reconciler;
pub use tesseract::TesseractEngine;
pub use vision::VisionEngine;
