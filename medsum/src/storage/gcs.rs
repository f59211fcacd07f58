use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::VisionConfig;
use crate::error::{MedsumError, Result};

use super::BlobStore;

/// Google Cloud Storage over the JSON API with a bearer access token.
/// Token minting is the deployment's job; this client only spends it.
pub struct GcsBlobStore {
    client: Client,
    base_url: String,
    bucket: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

impl GcsBlobStore {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedsumError::Storage(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.storage_base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            percent_encode(key)
        )
    }

    async fn check(&self, response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(MedsumError::Storage(format!(
            "GCS {action} failed: {status} - {body}"
        )))
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            self.bucket,
            percent_encode(key)
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        self.check(response, "upload").await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}?alt=media", self.object_url(key)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let response = self.check(response, "download").await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/storage/v1/b/{}/o?prefix={}",
            self.base_url,
            self.bucket,
            percent_encode(prefix)
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let response = self.check(response, "list").await?;
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| MedsumError::Storage(format!("Failed to parse list response: {e}")))?;

        Ok(body.items.into_iter().map(|i| i.name).collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        self.check(response, "delete").await?;
        Ok(())
    }
}

/// Percent-encode an object name for use in a URL path. GCS object names
/// contain slashes, which must be encoded in the object URL.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode_object_names() {
        assert_eq!(percent_encode("plain-name.tiff"), "plain-name.tiff");
        assert_eq!(percent_encode("job/out/page 1.json"), "job%2Fout%2Fpage%201.json");
    }

    #[test]
    fn test_object_url_encodes_key() {
        let store = GcsBlobStore::new(&VisionConfig {
            access_token: "token".to_string(),
            bucket: "scan-bucket".to_string(),
            vision_base_url: "https://vision.googleapis.com".to_string(),
            storage_base_url: "https://storage.googleapis.com".to_string(),
            timeout_secs: 30,
            poll_interval_ms: 2000,
            poll_attempts: 150,
        })
        .unwrap();

        assert_eq!(
            store.object_url("job/page-1.tiff"),
            "https://storage.googleapis.com/storage/v1/b/scan-bucket/o/job%2Fpage-1.tiff"
        );
    }

    #[test]
    fn test_list_response_tolerates_empty_body() {
        let body: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(body.items.is_empty());
    }
}
