use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Phase {
        service: String,
        phase: Phase,
        consecutive_failures: u32,
    },
    Log {
        service: String,
        line: String,
    },
}
