use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::VisionConfig;
use crate::error::{MedsumError, Result};
use crate::models::OcrOutcome;
use crate::processing::decode::Page;
use crate::storage::{BlobStore, GcsBlobStore};

use super::engine::{EngineKind, EngineTier, OcrEngine};

/// Cloud Vision document OCR. The API reads from and writes to a bucket,
/// so every page goes through the full choreography: upload, start the
/// async annotation job, poll it, download the result objects, then
/// delete everything that was staged. Cleanup runs on failure too, so
/// aborted jobs do not leak patient documents into the bucket.
pub struct VisionEngine {
    client: Client,
    storage: Arc<dyn BlobStore>,
    base_url: String,
    bucket: String,
    access_token: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationFile {
    #[serde(default)]
    responses: Vec<AnnotationResponse>,
}

#[derive(Debug, Deserialize)]
struct AnnotationResponse {
    #[serde(rename = "fullTextAnnotation")]
    full_text_annotation: Option<FullTextAnnotation>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

impl VisionEngine {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let storage = Arc::new(GcsBlobStore::new(config)?);
        Self::with_store(config, storage)
    }

    /// Construct with an explicit blob store, for tests and alternative
    /// staging backends.
    pub fn with_store(config: &VisionConfig, storage: Arc<dyn BlobStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedsumError::Ocr(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            storage,
            base_url: config.vision_base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_attempts: config.poll_attempts,
        })
    }

    async fn run_job(&self, input_key: &str, output_prefix: &str, tiff: Vec<u8>) -> Result<String> {
        self.storage.upload(input_key, tiff, "image/tiff").await?;

        let operation = self.start_annotation(input_key, output_prefix).await?;
        self.wait_for_operation(&operation).await?;

        let result_keys = self.storage.list(output_prefix).await?;
        if result_keys.is_empty() {
            return Err(MedsumError::Ocr(
                "Vision job produced no result objects".to_string(),
            ));
        }

        let mut text = String::new();
        for key in &result_keys {
            let bytes = self.storage.download(key).await?;
            let file: AnnotationFile = serde_json::from_slice(&bytes)
                .map_err(|e| MedsumError::Ocr(format!("Failed to parse Vision result: {e}")))?;
            for response in file.responses {
                if let Some(annotation) = response.full_text_annotation {
                    text.push_str(&annotation.text);
                    text.push('\n');
                }
            }
        }

        Ok(text.trim().to_string())
    }

    async fn start_annotation(&self, input_key: &str, output_prefix: &str) -> Result<String> {
        let request = json!({
            "requests": [{
                "inputConfig": {
                    "gcsSource": { "uri": format!("gs://{}/{}", self.bucket, input_key) },
                    "mimeType": "image/tiff"
                },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
                "outputConfig": {
                    "gcsDestination": { "uri": format!("gs://{}/{}", self.bucket, output_prefix) },
                    "batchSize": 1
                }
            }]
        });

        let response = self
            .client
            .post(format!("{}/v1/files:asyncBatchAnnotate", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MedsumError::Ocr(format!(
                "Vision annotation request failed: {status} - {body}"
            )));
        }

        let handle: OperationHandle = response
            .json()
            .await
            .map_err(|e| MedsumError::Ocr(format!("Failed to parse operation handle: {e}")))?;

        Ok(handle.name)
    }

    async fn wait_for_operation(&self, operation: &str) -> Result<()> {
        for attempt in 0..self.poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let response = self
                .client
                .get(format!("{}/v1/{}", self.base_url, operation))
                .bearer_auth(&self.access_token)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(MedsumError::Ocr(format!(
                    "Vision operation poll failed: {status} - {body}"
                )));
            }

            let status: OperationStatus = response
                .json()
                .await
                .map_err(|e| MedsumError::Ocr(format!("Failed to parse operation status: {e}")))?;

            if status.done {
                if let Some(error) = status.error {
                    return Err(MedsumError::Ocr(format!(
                        "Vision job failed: {}",
                        error.message
                    )));
                }
                return Ok(());
            }

            debug!(operation, attempt, "Vision job still running");
        }

        Err(MedsumError::Ocr(format!(
            "Vision job did not finish within {} poll attempts",
            self.poll_attempts
        )))
    }

    /// Best-effort removal of everything the job staged. Failures are
    /// logged, not propagated, so cleanup never masks the OCR outcome.
    async fn cleanup(&self, input_key: &str, output_prefix: &str) {
        if let Err(e) = self.storage.delete(input_key).await {
            warn!(key = input_key, error = %e, "Failed to delete staged input");
        }

        match self.storage.list(output_prefix).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.storage.delete(&key).await {
                        warn!(key = %key, error = %e, "Failed to delete result object");
                    }
                }
            }
            Err(e) => warn!(prefix = output_prefix, error = %e, "Failed to list result objects for cleanup"),
        }
    }
}

/// Vision's async file API accepts PDF and TIFF sources, so the PNG page
/// raster is re-encoded before staging.
fn encode_page_as_tiff(png: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(png)
        .map_err(|e| MedsumError::Ocr(format!("Failed to decode page raster: {e}")))?;
    let mut tiff = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut tiff), ImageFormat::Tiff)
        .map_err(|e| MedsumError::Ocr(format!("Failed to encode TIFF: {e}")))?;
    Ok(tiff)
}

#[async_trait]
impl OcrEngine for VisionEngine {
    fn id(&self) -> &'static str {
        "vision"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::GeneralPurpose
    }

    fn tier(&self) -> EngineTier {
        EngineTier::Secondary
    }

    async fn recognize(&self, page: &Page, _language_hint: Option<&str>) -> OcrOutcome {
        let job = Uuid::new_v4();
        let input_key = format!("{job}/page-{}.tiff", page.number);
        let output_prefix = format!("{job}/out/");

        let tiff = match encode_page_as_tiff(&page.png) {
            Ok(tiff) => tiff,
            Err(e) => return OcrOutcome::failure(self.id(), e.to_string()),
        };

        let result = self.run_job(&input_key, &output_prefix, tiff).await;
        self.cleanup(&input_key, &output_prefix).await;

        match result {
            Ok(text) => OcrOutcome::success(self.id(), text, None),
            Err(e) => OcrOutcome::failure(self.id(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metadata() {
        let config = VisionConfig {
            access_token: "token".to_string(),
            bucket: "scan-bucket".to_string(),
            vision_base_url: "https://vision.googleapis.com".to_string(),
            storage_base_url: "https://storage.googleapis.com".to_string(),
            timeout_secs: 30,
            poll_interval_ms: 10,
            poll_attempts: 3,
        };
        let engine = VisionEngine::new(&config).unwrap();
        assert_eq!(engine.id(), "vision");
        assert_eq!(engine.kind(), EngineKind::GeneralPurpose);
        assert_eq!(engine.tier(), EngineTier::Secondary);
    }

    #[test]
    fn test_encode_page_as_tiff() {
        let img = image::DynamicImage::new_luma8(60, 60);
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let tiff = encode_page_as_tiff(&png).unwrap();
        assert!(!tiff.is_empty());
        let decoded = image::load_from_memory(&tiff).unwrap();
        assert_eq!(decoded.width(), 60);
    }

    #[test]
    fn test_encode_garbage_fails() {
        assert!(encode_page_as_tiff(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_annotation_file_parsing() {
        let body = r#"{
            "responses": [
                { "fullTextAnnotation": { "text": "page text" } },
                { }
            ]
        }"#;
        let file: AnnotationFile = serde_json::from_str(body).unwrap();
        assert_eq!(file.responses.len(), 2);
        assert_eq!(
            file.responses[0].full_text_annotation.as_ref().unwrap().text,
            "page text"
        );
        assert!(file.responses[1].full_text_annotation.is_none());
    }
}
