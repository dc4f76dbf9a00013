use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Health probe deadline per host.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[allow(dead_code)]
    issues: Option<Vec<serde_json::Value>>,
}

/// `GET {apiURL}/health` with a 2-second deadline. Any transport
/// failure or non-`healthy` status counts as a failed probe; the host
/// stays in the candidate set with a penalty.
pub async fn probe_health(client: &reqwest::Client, api_url: &str) -> ProbeOutcome {
    let url = format!("{}/health", api_url.trim_end_matches('/'));
    let started = Instant::now();
    let response = client.get(&url).timeout(PROBE_TIMEOUT).send().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<HealthResponse>().await {
            Ok(body) => {
                let healthy = body.status == "healthy";
                debug!("probe {}: {} in {}ms", api_url, body.status, latency_ms);
                ProbeOutcome { healthy, latency_ms: Some(latency_ms) }
            }
            Err(e) => {
                debug!("probe {}: bad body: {}", api_url, e);
                ProbeOutcome { healthy: false, latency_ms: Some(latency_ms) }
            }
        },
        Ok(resp) => {
            debug!("probe {}: http {}", api_url, resp.status());
            ProbeOutcome { healthy: false, latency_ms: Some(latency_ms) }
        }
        Err(e) => {
            debug!("probe {}: {}", api_url, e);
            ProbeOutcome { healthy: false, latency_ms: None }
        }
    }
}
