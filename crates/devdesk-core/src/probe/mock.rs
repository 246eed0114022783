use std::sync::Arc;

use async_trait::async_trait;
use devdesk_types::Probe;

use crate::{
    probe::{ProbeOutcome, ReadinessProbe},
    process_manager::MockWorld,
};

/// Answers process-pattern probes from the mock world, treating the pattern
/// as a service name.
#[derive(Debug)]
pub(crate) struct MockProber {
    world: Arc<MockWorld>,
}

impl MockProber {
    pub fn new(world: Arc<MockWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ReadinessProbe for MockProber {
    async fn check(&self, probe: &Probe) -> ProbeOutcome {
        let Probe::ProcessPatternRunning { pattern } = probe else {
            return ProbeOutcome::Error(format!("unsupported mock probe {probe}"));
        };
        if self.world.is_hung(pattern.as_str()) {
            std::future::pending::<()>().await;
        }
        if self.world.is_ready(pattern.as_str()) {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::NotReady(format!("{pattern} is not serving"))
        }
    }
}
