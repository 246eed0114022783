mod error;
mod log_tail;
mod probe;
mod process_manager;
mod supervisor;
mod types;

pub use error::{Error, Result};
pub use log_tail::{LineAssembler, LogTail, MAX_LINE_LEN};
pub use probe::{ProbeOutcome, ReadinessProbe, SystemProber};
#[cfg(unix)]
pub use process_manager::UnixProcessManager;
pub use process_manager::{BoxStream, CommandSpec, ProcId, Process, ProcessManager, Spawned};
pub use supervisor::{Supervisor, SupervisorEvent};
pub use types::{Phase, ServiceStatus};
