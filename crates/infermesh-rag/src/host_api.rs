//! Host inference HTTP API client.
//!
//! The base URL is the host's registered `apiURL`. Responses follow the
//! host contract: `/v1/embed` is OpenAI-compatible (384-dim), the
//! vision endpoints answer 503 while their models load.

use crate::error::{RagError, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const EMBED_MODEL: &str = "all-MiniLM-L6-v2";

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_sessions: u32,
    pub total_jobs_completed: u64,
    #[serde(default)]
    pub models_loaded: Vec<String>,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub build: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub chains: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeResult {
    pub description: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

pub struct HostApiClient {
    base_url: String,
    chain_id: u64,
    client: reqwest::Client,
}

impl HostApiClient {
    pub fn new(base_url: impl Into<String>, chain_id: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client construction is infallible with static options");
        let base_url: String = base_url.into();
        Self { base_url: base_url.trim_end_matches('/').to_string(), chain_id, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn health_ok(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn status(&self) -> Result<HostStatus> {
        let resp = self
            .client
            .get(self.url("/status"))
            .send()
            .await
            .map_err(|e| RagError::Http(e.to_string()))?;
        resp.json().await.map_err(|e| RagError::Http(format!("status decode: {e}")))
    }

    pub async fn version(&self) -> Result<VersionInfo> {
        let resp = self
            .client
            .get(self.url("/v1/version"))
            .send()
            .await
            .map_err(|e| RagError::Http(e.to_string()))?;
        resp.json().await.map_err(|e| RagError::Http(format!("version decode: {e}")))
    }

    /// Embed one or more inputs; 384-dim vectors in input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "input": inputs, "model": EMBED_MODEL });
        let resp = self
            .client
            .post(self.url("/v1/embed"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Http(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(RagError::ModelNotLoaded(EMBED_MODEL.into()));
        }
        if !resp.status().is_success() {
            return Err(RagError::Http(format!("embed: {}", resp.status())));
        }
        let parsed: EmbedResponse =
            resp.json().await.map_err(|e| RagError::Http(format!("embed decode: {e}")))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    pub async fn ocr(&self, image_b64: &str, format: &str) -> Result<OcrResult> {
        let body = json!({
            "image": image_b64,
            "format": format,
            "language": "en",
            "chainId": self.chain_id,
        });
        let resp = self
            .client
            .post(self.url("/v1/ocr"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Http(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(RagError::ModelNotLoaded("ocr".into()));
        }
        if !resp.status().is_success() {
            return Err(RagError::Http(format!("ocr: {}", resp.status())));
        }
        resp.json().await.map_err(|e| RagError::Http(format!("ocr decode: {e}")))
    }

    pub async fn describe_image(&self, image_b64: &str, format: &str) -> Result<DescribeResult> {
        let body = json!({
            "image": image_b64,
            "format": format,
            "detail": "detailed",
            "chainId": self.chain_id,
        });
        let resp = self
            .client
            .post(self.url("/v1/describe-image"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Http(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(RagError::ModelNotLoaded("vision".into()));
        }
        if !resp.status().is_success() {
            return Err(RagError::Http(format!("describe: {}", resp.status())));
        }
        resp.json().await.map_err(|e| RagError::Http(format!("describe decode: {e}")))
    }
}
