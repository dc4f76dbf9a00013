//! The supervision loop.
//!
//! Spawn, probe, watch, restart. The event listener runs as its own
//! task and reconnects across subprocess restarts; the main loop owns
//! the child process and applies the restart policy on every exit.

use crate::binary::resolve_binary;
use crate::config::SupervisorConfig;
use crate::error::{HostError, Result};
use crate::events::HostEvent;
use crate::health::wait_until_healthy;
use crate::process::InferenceProcess;
use crate::proofs::ProofScheduler;
use crate::restart::RestartTracker;
use futures::StreamExt;
use infermesh_storage::StorageAdapter;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

/// Reconnect backoff bounds for the event socket.
const EVENT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const EVENT_BACKOFF_MAX: Duration = Duration::from_secs(60);

pub struct Supervisor {
    config: SupervisorConfig,
    scheduler: Arc<ProofScheduler<Arc<dyn StorageAdapter>>>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        scheduler: Arc<ProofScheduler<Arc<dyn StorageAdapter>>>,
    ) -> Self {
        Self { config, scheduler }
    }

    /// Run until the restart policy gives up or the operator stops us.
    pub async fn run(self) -> Result<()> {
        let binary = resolve_binary(self.config.inference.binary_path.as_deref())?;
        let mut tracker = RestartTracker::new(self.config.restart.clone());
        let http = reqwest::Client::new();
        let local_api = self.config.local_api_url();

        // The listener outlives individual subprocess runs
        tokio::spawn(watch_events(self.config.events_ws_url(), self.scheduler.clone()));

        loop {
            let mut process = InferenceProcess::spawn(&binary, &self.config.inference)?;

            if !wait_until_healthy(&http, &local_api).await {
                warn!("inference server never became healthy");
                let uptime = process.uptime();
                let _ = process.shutdown().await;
                match tracker.next_restart(false, uptime) {
                    Some(delay) => {
                        warn!("restarting in {delay:?} (attempt {})", tracker.attempts());
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(HostError::HealthTimeout),
                }
            }
            info!("inference server ready at {local_api}");

            let exited = tokio::select! {
                result = process.wait() => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };

            match exited {
                None => {
                    info!("shutdown requested");
                    process.shutdown().await?;
                    return Ok(());
                }
                Some(result) => {
                    let clean = result?;
                    let uptime = process.uptime();
                    warn!(
                        "inference process exited ({}) after {:?}",
                        if clean { "clean" } else { "failure" },
                        uptime
                    );
                    match tracker.next_restart(clean, uptime) {
                        Some(delay) => {
                            info!("restarting in {delay:?} (attempt {})", tracker.attempts());
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            info!("restart policy satisfied, supervisor exiting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Consume the engine's event WebSocket, reconnecting with capped
/// backoff whenever it drops (including across restarts).
async fn watch_events(url: String, scheduler: Arc<ProofScheduler<Arc<dyn StorageAdapter>>>) {
    let mut backoff = EVENT_BACKOFF_INITIAL;
    loop {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((mut ws, _)) => {
                info!("listening for session events at {url}");
                backoff = EVENT_BACKOFF_INITIAL;
                while let Some(message) = ws.next().await {
                    let text = match message {
                        Ok(WsMessage::Text(text)) => text,
                        Ok(WsMessage::Close(_)) | Err(_) => break,
                        Ok(_) => continue,
                    };
                    let event: HostEvent = match serde_json::from_str(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("undecodable engine event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = scheduler.handle_event(event).await {
                        error!("event handling failed: {e}");
                    }
                }
                warn!("event socket closed, reconnecting");
            }
            Err(e) => {
                warn!("event socket connect failed: {e}, retrying in {backoff:?}");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(EVENT_BACKOFF_MAX);
    }
}
