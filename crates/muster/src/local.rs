//! Local process control
//!
//! Starts camera recording/preview commands as child processes and kills
//! them by pid. Child handles are retained so termination can be
//! confirmed with `wait` instead of firing signals blind; a handle is
//! released only once its process is confirmed gone.

use crate::error::{Result, RigError};
use crate::registry::Device;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::{Child, Command};

/// What a camera process does with its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Write to a file under the active block path.
    Record,
    /// Live view only, no output file.
    Preview,
}

/// Starts and terminates local acquisition processes.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Spawn the camera command and return its pid. `output` is required
    /// for `Record` and ignored for `Preview`.
    async fn spawn(
        &self,
        camera: &Device,
        mode: CaptureMode,
        output: Option<&Path>,
    ) -> Result<u32>;

    /// Terminate a previously spawned process and wait for it to exit.
    async fn kill(&self, camera: &Device, pid: u32) -> Result<()>;
}

/// Production implementation backed by tokio child processes.
pub struct CommandRunner {
    children: Mutex<HashMap<u32, Child>>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessControl for CommandRunner {
    async fn spawn(
        &self,
        camera: &Device,
        mode: CaptureMode,
        output: Option<&Path>,
    ) -> Result<u32> {
        let (name, state_file, record_command, preview_command) = match camera {
            Device::LocalCamera {
                name,
                state_file,
                record_command,
                preview_command,
            } => (name, state_file, record_command, preview_command),
            Device::RemoteController { name, .. } => {
                return Err(RigError::Conflict(format!("{} is not a local camera", name)));
            }
        };

        let mut command = match mode {
            CaptureMode::Record => {
                let output = output.ok_or_else(|| {
                    RigError::Conflict(format!("recording on {} requires an output path", name))
                })?;
                let mut c = Command::new(record_command);
                c.arg(state_file).arg("-o").arg(output);
                c
            }
            CaptureMode::Preview => {
                let mut c = Command::new(preview_command);
                c.arg(state_file);
                c
            }
        };

        let child = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id().ok_or_else(|| {
            RigError::Termination {
                device: name.to_string(),
                reason: "process exited before a pid could be read".to_string(),
            }
        })?;

        self.children.lock().unwrap().insert(pid, child);
        tracing::info!(device = %name, pid, mode = ?mode, "local process spawned");
        Ok(pid)
    }

    async fn kill(&self, camera: &Device, pid: u32) -> Result<()> {
        let mut child = self
            .children
            .lock()
            .unwrap()
            .remove(&pid)
            .ok_or_else(|| RigError::ProcessNotFound(format!("pid {}", pid)))?;

        if let Err(e) = child.start_kill() {
            // Keep the handle so the operator can retry.
            let reason = e.to_string();
            self.children.lock().unwrap().insert(pid, child);
            return Err(RigError::Termination {
                device: camera.name().to_string(),
                reason,
            });
        }

        // Reap it; without this the child lingers as a zombie.
        match child.wait().await {
            Ok(status) => {
                tracing::info!(device = %camera.name(), pid, %status, "local process terminated");
                Ok(())
            }
            Err(e) => Err(RigError::Termination {
                device: camera.name().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
