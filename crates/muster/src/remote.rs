//! Remote Command Dispatcher
//!
//! Translates logical commands (test connection, start acquisition, stop
//! a pid) into one-shot requests over the management channel to a remote
//! controller and parses the textual response. Controllers are few, so
//! there is no connection pooling; every command opens its own channel
//! and is bounded by a timeout so a dead controller cannot stall the
//! orchestration loop.

use crate::error::{Result, RigError};
use crate::registry::{RemoteAddress, RemoteSpec};
use crate::tracker::ProcessId;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Raw outcome of one command over the management channel.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Management channel to a remote controller.
///
/// The production implementation shells out to the system ssh client;
/// tests substitute scripted fakes.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn exec(&self, address: &RemoteAddress, command: &str) -> std::io::Result<ChannelOutput>;
}

/// Channel backed by the system ssh client, one connection per command.
pub struct SshChannel;

#[async_trait]
impl CommandChannel for SshChannel {
    async fn exec(&self, address: &RemoteAddress, command: &str) -> std::io::Result<ChannelOutput> {
        let output = tokio::process::Command::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(address.port.to_string())
            .arg(format!("{}@{}", address.user, address.host))
            .arg(command)
            .output()
            .await?;

        Ok(ChannelOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Connectivity check result. Expected network failures are values, not
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reachability {
    Reachable,
    Unreachable { reason: String },
}

/// Issues commands to remote controllers.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn CommandChannel>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn CommandChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    async fn exec_bounded(
        &self,
        address: &RemoteAddress,
        command: &str,
    ) -> std::result::Result<ChannelOutput, String> {
        match tokio::time::timeout(self.timeout, self.channel.exec(address, command)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("channel error: {}", e)),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }

    /// Check that the controller answers at all.
    pub async fn test_connection(&self, spec: RemoteSpec<'_>) -> Reachability {
        // Cheapest possible round trip, same as a manual `ssh host ls`.
        match self.exec_bounded(spec.address, "ls").await {
            Ok(output) if output.success => Reachability::Reachable,
            Ok(output) => Reachability::Unreachable {
                reason: excerpt(&output.stderr),
            },
            Err(reason) => Reachability::Unreachable { reason },
        }
    }

    /// Launch the acquisition script and return the remote pid.
    ///
    /// The script is detached on the controller so it survives the
    /// channel closing; its pid is echoed back on stdout.
    pub async fn start(&self, spec: RemoteSpec<'_>) -> Result<ProcessId> {
        let mut options = String::new();
        for (k, v) in spec.options {
            options.push_str(&format!("--{} {} ", k, v));
        }
        let command = format!(
            "nohup python {} {}>/dev/null 2>&1 & echo $!",
            spec.script.display(),
            options
        );

        tracing::debug!(device = %spec.name, %command, "remote start");

        let output = self
            .exec_bounded(spec.address, &command)
            .await
            .map_err(|detail| RigError::RemoteStart {
                device: spec.name.to_string(),
                detail,
            })?;

        if !output.success {
            return Err(RigError::RemoteStart {
                device: spec.name.to_string(),
                detail: excerpt(&output.stderr),
            });
        }

        let pid: u32 = output
            .stdout
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| RigError::RemoteStart {
                device: spec.name.to_string(),
                detail: format!("no pid in response: {:?}", excerpt(&output.stdout)),
            })?;

        tracing::info!(device = %spec.name, pid, "remote script started");
        Ok(ProcessId::Remote(pid))
    }

    /// Terminate one pid on the controller.
    pub async fn stop(&self, spec: RemoteSpec<'_>, pid: u32) -> Result<()> {
        let command = format!("kill {}", pid);
        let output = self
            .exec_bounded(spec.address, &command)
            .await
            .map_err(|reason| RigError::RemoteStop {
                device: spec.name.to_string(),
                reason,
            })?;

        if !output.success {
            return Err(RigError::RemoteStop {
                device: spec.name.to_string(),
                reason: format!("kill {} failed: {}", pid, excerpt(&output.stderr)),
            });
        }

        tracing::info!(device = %spec.name, pid, "remote process stopped");
        Ok(())
    }

    /// Panic button: terminate every acquisition interpreter on the
    /// controller, tracked or not.
    pub async fn stop_all(&self, spec: RemoteSpec<'_>) -> Result<()> {
        let output = self
            .exec_bounded(spec.address, "killall python")
            .await
            .map_err(|reason| RigError::RemoteStop {
                device: spec.name.to_string(),
                reason,
            })?;

        // killall reports failure when nothing matched; that is the
        // desired end state, not an error.
        if !output.success && !output.stderr.contains("no process found") {
            return Err(RigError::RemoteStop {
                device: spec.name.to_string(),
                reason: excerpt(&output.stderr),
            });
        }

        tracing::info!(device = %spec.name, "remote processes stopped");
        Ok(())
    }
}

/// First line of a command's output, enough for an operator message.
fn excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        "(no output)".to_string()
    } else {
        line.to_string()
    }
}
