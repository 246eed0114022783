use std::{fmt, time::SystemTime};

/// Lifecycle phase of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Registered, dependencies not yet satisfied.
    Pending,
    /// Launched, waiting for the first successful probe.
    Starting,
    /// Alive and the last probe succeeded.
    Ready,
    /// Probe or liveness failure, restart in progress.
    Degraded,
    /// Restarts exhausted. Only an explicit restart leaves this phase.
    Failed,
    /// Terminated on request.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Pending => "pending",
            Phase::Starting => "starting",
            Phase::Ready => "ready",
            Phase::Degraded => "degraded",
            Phase::Failed => "failed",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of one service, as returned by `Supervisor::status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub phase: Phase,
    pub consecutive_failures: u32,
    pub last_transition: SystemTime,
    pub pid: Option<u32>,
}
