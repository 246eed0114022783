#[cfg(test)]
mod mock;
#[cfg(unix)]
mod unix;

#[cfg(test)]
pub(crate) use mock::{MockProcessManager, MockWorld};
#[cfg(unix)]
pub use unix::UnixProcessManager;
