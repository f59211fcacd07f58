use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{AbbyyConfig, DictaConfig};
use crate::error::{MedsumError, Result};
use crate::models::OcrOutcome;
use crate::processing::decode::Page;

use super::engine::{EngineKind, EngineTier, OcrEngine};

const MAX_RETRIES: u32 = 3;

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2_u64.pow(attempt))
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Hebrew-specialized OCR service. Takes a multipart page upload and
/// returns plain extracted text.
pub struct DictaEngine {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DictaResponse {
    #[serde(default)]
    text: String,
}

impl DictaEngine {
    pub fn new(config: &DictaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedsumError::Ocr(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn request_text(&self, page: &Page) -> Result<String> {
        let mut retries = 0;

        loop {
            // multipart forms are consumed per send, so rebuild each attempt
            let part = multipart::Part::bytes(page.png.clone())
                .file_name(format!("page-{}.png", page.number))
                .mime_str("image/png")
                .map_err(|e| MedsumError::Ocr(format!("Invalid multipart payload: {e}")))?;
            let form = multipart::Form::new().part("file", part);

            let response = self
                .client
                .post(&self.base_url)
                .multipart(form)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: DictaResponse = resp
                        .json()
                        .await
                        .map_err(|e| MedsumError::Ocr(format!("Failed to parse response: {e}")))?;
                    return Ok(body.text.trim().to_string());
                }
                Ok(resp) if retryable_status(resp.status()) && retries < MAX_RETRIES => {
                    retries += 1;
                    tokio::time::sleep(retry_delay(retries)).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(MedsumError::Ocr(format!(
                        "Dicta request failed: {status} - {body}"
                    )));
                }
                Err(_) if retries < MAX_RETRIES => {
                    retries += 1;
                    tokio::time::sleep(retry_delay(retries)).await;
                }
                Err(e) => {
                    return Err(MedsumError::Ocr(format!(
                        "Dicta request failed after {MAX_RETRIES} retries: {e}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl OcrEngine for DictaEngine {
    fn id(&self) -> &'static str {
        "dicta"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::HebrewSpecialized
    }

    fn tier(&self) -> EngineTier {
        EngineTier::Primary
    }

    async fn recognize(&self, page: &Page, _language_hint: Option<&str>) -> OcrOutcome {
        match self.request_text(page).await {
            Ok(text) => OcrOutcome::success(self.id(), text, None),
            Err(e) => OcrOutcome::failure(self.id(), e.to_string()),
        }
    }
}

/// Commercial OCR gateway. The only backend that reports a structured
/// per-page confidence score.
pub struct AbbyyEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct AbbyyRequest {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AbbyyResponse {
    success: bool,
    #[serde(default)]
    text: String,
    confidence: Option<f32>,
    error: Option<String>,
}

impl AbbyyEngine {
    pub fn new(config: &AbbyyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedsumError::Ocr(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn request_text(
        &self,
        page: &Page,
        language_hint: Option<&str>,
    ) -> Result<(String, Option<f32>)> {
        let request = AbbyyRequest {
            image: STANDARD.encode(&page.png),
            language: language_hint.map(String::from),
        };

        let mut retries = 0;

        loop {
            let mut builder = self
                .client
                .post(format!("{}/api/process", self.base_url))
                .json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.header("Authorization", format!("Bearer {key}"));
            }

            match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: AbbyyResponse = resp
                        .json()
                        .await
                        .map_err(|e| MedsumError::Ocr(format!("Failed to parse response: {e}")))?;

                    if !body.success {
                        return Err(MedsumError::Ocr(
                            body.error
                                .unwrap_or_else(|| "ABBYY reported failure without detail".into()),
                        ));
                    }
                    return Ok((body.text.trim().to_string(), body.confidence));
                }
                Ok(resp) if retryable_status(resp.status()) && retries < MAX_RETRIES => {
                    retries += 1;
                    tokio::time::sleep(retry_delay(retries)).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(MedsumError::Ocr(format!(
                        "ABBYY request failed: {status} - {body}"
                    )));
                }
                Err(_) if retries < MAX_RETRIES => {
                    retries += 1;
                    tokio::time::sleep(retry_delay(retries)).await;
                }
                Err(e) => {
                    return Err(MedsumError::Ocr(format!(
                        "ABBYY request failed after {MAX_RETRIES} retries: {e}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl OcrEngine for AbbyyEngine {
    fn id(&self) -> &'static str {
        "abbyy"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::GeneralPurpose
    }

    fn tier(&self) -> EngineTier {
        EngineTier::Secondary
    }

    async fn recognize(&self, page: &Page, language_hint: Option<&str>) -> OcrOutcome {
        match self.request_text(page, language_hint).await {
            Ok((text, confidence)) => OcrOutcome::success(self.id(), text, confidence),
            Err(e) => OcrOutcome::failure(self.id(), e.to_string()),
        }
    }
}
