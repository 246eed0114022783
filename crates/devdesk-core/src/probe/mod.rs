use std::fmt;

use devdesk_types::Probe;

#[cfg(test)]
mod mock;
mod system;

#[cfg(test)]
pub(crate) use mock::MockProber;
pub use system::SystemProber;

/// Result of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    /// The target answered, or was reachable, but is not serving yet.
    NotReady(String),
    /// The check itself could not be carried out.
    Error(String),
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Ready => f.write_str("ready"),
            ProbeOutcome::NotReady(reason) => write!(f, "not ready: {reason}"),
            ProbeOutcome::Error(reason) => write!(f, "probe error: {reason}"),
        }
    }
}

#[async_trait::async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Check whether the target of `probe` is serving.
    async fn check(&self, probe: &Probe) -> ProbeOutcome;
}
