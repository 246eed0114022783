mod base;
mod implementations;
mod types;

pub use base::{Process, ProcessManager};
#[cfg(test)]
pub(crate) use implementations::{MockProcessManager, MockWorld};
#[cfg(unix)]
pub use implementations::UnixProcessManager;
pub use types::{BoxStream, CommandSpec, ProcId, Spawned};
