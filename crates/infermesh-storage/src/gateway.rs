use crate::adapter::StorageAdapter;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Storage adapter over an HTTP portal exposing the blob store's
/// directory API: `PUT/GET/DELETE {base}/fs/{path}` and
/// `GET {base}/fs/{prefix}?list=true` returning a JSON array of paths.
pub struct HttpGatewayStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGatewayStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client construction is infallible with static options");
        let base_url: String = base_url.into();
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/fs/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl StorageAdapter for HttpGatewayStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.url_for(path);
        debug!("storage put {} ({} bytes)", path, bytes.len());
        let response = self
            .client
            .put(&url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::INSUFFICIENT_STORAGE {
            return Err(StorageError::Quota(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::WriteFailed(format!("{path}: {}", response.status())));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::Transport(format!("{path}: {}", response.status())));
        }
        let bytes =
            response.bytes().await.map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}?list=true", self.url_for(prefix));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StorageError::Transport(format!("{prefix}: {}", response.status())));
        }
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| StorageError::Transport(format!("list decode: {e}")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url_for(path);
        // Best-effort: a missing entry is already deleted
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND
        {
            return Err(StorageError::WriteFailed(format!("{path}: {}", response.status())));
        }
        Ok(())
    }
}
