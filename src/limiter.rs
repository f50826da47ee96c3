use tracing::{info, warn};

use crate::alert;
use crate::command::{DaemonCommand, Executor, Percent};
use crate::status;

/// Enable/disable/restart operations over the daemon's maintain mode.
///
/// Every operation ends with a fresh status read so the caller can display
/// the true post-operation state even after an error; failures degrade the
/// returned percentage to `None` instead of propagating.
pub struct Limiter {
    exec: Executor,
}

impl Limiter {
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }

    /// Start maintaining at `target`, or at the daemon's current target
    /// (falling back to 80) when the caller does not pin one. Idempotent at
    /// the daemon level. Returns the post-operation charge percentage.
    pub async fn enable(&self, target: Option<Percent>, allow_force_discharge: bool) -> Option<u8> {
        let target = match target {
            Some(t) => t,
            None => match status::read(&self.exec).await {
                Ok(current) => current.target(),
                Err(e) => {
                    warn!(error = %e, "status read before enable failed");
                    Percent::default()
                }
            },
        };

        info!(target = %target, allow_force_discharge, "enabling limiter");
        let result = self
            .exec
            .daemon(DaemonCommand::Maintain {
                percent: target,
                force_discharge: allow_force_discharge,
            })
            .await;
        if let Some(err) = &result.error {
            warn!(error = %err.trim(), "enable failed");
            alert::alert(&format!("Battery limiter error: {}", err.trim())).await;
        } else if result.timed_out {
            warn!("enable timed out");
        }

        self.read_percentage().await
    }

    /// Stop maintaining. Returns the post-operation charge percentage.
    pub async fn disable(&self) -> Option<u8> {
        info!("disabling limiter");
        let result = self.exec.daemon(DaemonCommand::MaintainStop).await;
        if let Some(err) = &result.error {
            warn!(error = %err.trim(), "disable failed");
            alert::alert(&format!("Battery limiter error: {}", err.trim())).await;
        }

        self.read_percentage().await
    }

    /// Disable then re-enable; applies a changed daemon-affecting setting
    /// (force-discharge permission) while the limiter is active.
    pub async fn restart(&self, target: Option<Percent>, allow_force_discharge: bool) {
        self.disable().await;
        self.enable(target, allow_force_discharge).await;
    }

    async fn read_percentage(&self) -> Option<u8> {
        match status::read(&self.exec).await {
            Ok(status) => status.percentage,
            Err(e) => {
                warn!(error = %e, "post-operation status read failed");
                None
            }
        }
    }
}
