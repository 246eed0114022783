use std::{fmt::Debug, time::Duration};

use crate::{
    error::{Error, Result},
    process_manager::types::{CommandSpec, ProcId, Spawned},
};

/// Time allowed for reaping a process after it was forcefully killed.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait::async_trait]
pub trait ProcessManager: Send + Sync {
    /// Spawn a new process.
    async fn spawn(&self, spec: CommandSpec) -> Result<Spawned>;
}

/// Ownership of one live operating-system process.
#[async_trait::async_trait]
pub trait Process: Debug + Send + Sync {
    fn id(&self) -> ProcId;
    fn pid(&self) -> Option<u32>;
    /// Non-blocking liveness check.
    fn is_alive(&mut self) -> bool;
    /// Gracefully shutdown a process.
    async fn shutdown(&mut self) -> Result<()>;
    /// Wait for a process to exit.
    async fn wait(&mut self, d: Duration) -> Result<Option<i32>>;
    /// Forcefully kill a process.
    async fn kill(&mut self) -> Result<()>;

    /// Shutdown gracefully, escalating to a kill once `grace` has elapsed.
    /// Whatever is left of the process group after the leader exits is
    /// killed as well. Returns the exit code of the leader.
    async fn terminate(&mut self, grace: Duration) -> Result<i32> {
        if self.is_alive() {
            if let Err(err) = self.shutdown().await {
                tracing::debug!("Graceful shutdown of {:?} failed: {err}", self.id());
            }
            if let Some(code) = self.wait(grace).await? {
                self.kill().await?;
                return Ok(code);
            }
            tracing::warn!(
                "Process {:?} still running after {grace:?}, killing it",
                self.id()
            );
        }

        // Also reaches children that outlived an already exited leader.
        self.kill().await?;
        self.wait(KILL_REAP_TIMEOUT).await?.ok_or_else(|| {
            Error::Internal(format!("process {:?} survived SIGKILL", self.id()))
        })
    }
}
