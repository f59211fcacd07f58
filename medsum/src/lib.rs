//! medsum: document digitization for mixed Hebrew/English medical records.
//!
//! A document enters as raw bytes, is decoded into page rasters, each
//! page is read by one or more competing OCR engines whose outputs are
//! reconciled into one best-effort text, and the text is chunked and
//! summarized by a language model into an occupational-medicine summary.
//!
//! The pipeline is a pure function over (document, configuration):
//! construct a [`Pipeline`] once and call
//! [`Pipeline::process`](processing::Pipeline::process) per document.

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod processing;
pub mod storage;
pub mod summarizer;

pub use config::Config;
pub use error::{MedsumError, Result};
pub use models::{BatchReport, DocumentReport, ProcessOptions, Stage, SummaryReport};
pub use processing::Pipeline;
pub use summarizer::{Summarizer, SummaryOptions};
