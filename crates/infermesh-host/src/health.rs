//! Startup health probing.

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-probe deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Total budget before the subprocess is declared unhealthy.
const TOTAL_BUDGET: Duration = Duration::from_secs(30);
const INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Probe `GET {base}/health` with exponential backoff until it answers
/// 200 or the 30-second budget runs out.
pub async fn wait_until_healthy(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let started = Instant::now();
    let mut delay = INITIAL_DELAY;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("inference server healthy after {} probe(s)", attempt);
                return true;
            }
            Ok(resp) => debug!("health probe {}: http {}", attempt, resp.status()),
            Err(e) => debug!("health probe {}: {}", attempt, e),
        }
        if started.elapsed() + delay > TOTAL_BUDGET {
            return false;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(8));
    }
}
