//! Inference subprocess lifecycle.

use crate::config::InferenceConfig;
use crate::error::{HostError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Grace period between SIGTERM and SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct InferenceProcess {
    child: Child,
    started_at: Instant,
}

impl InferenceProcess {
    /// Spawn the engine with the resolved settings. Stdout/stderr are
    /// inherited so engine logs land in the supervisor's sink.
    pub fn spawn(binary: &Path, config: &InferenceConfig) -> Result<Self> {
        let mut command = Command::new(binary);
        command
            .arg("--listen")
            .arg(&config.listen_address)
            .arg("--port")
            .arg(config.port.to_string())
            .arg("--log-level")
            .arg(&config.log_level)
            .arg("--public-url")
            .arg(&config.public_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for model in &config.models_to_preload {
            command.arg("--preload").arg(model);
        }

        let child = command.spawn().map_err(|e| HostError::Spawn(e.to_string()))?;
        info!(
            "spawned {} (pid {:?}) on {}:{}",
            binary.display(),
            child.id(),
            config.listen_address,
            config.port
        );
        Ok(Self { child, started_at: Instant::now() })
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wait for the child to exit; `true` for a clean (zero) exit.
    pub async fn wait(&mut self) -> Result<bool> {
        let status = self.child.wait().await?;
        Ok(status.success())
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL.
    pub async fn shutdown(mut self) -> Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(()); // already exited
        };

        // SAFETY: pid came from a child we own; worst case the process
        // exited and the signal hits nothing.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        info!("sent SIGTERM to inference process {pid}");

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("inference process exited: {status}");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!("inference process ignored SIGTERM, killing");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}
