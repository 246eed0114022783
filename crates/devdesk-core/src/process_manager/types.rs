use std::{fmt::Debug, path::PathBuf, pin::Pin};

use devdesk_types::ServiceDescriptor;
use futures::Stream;

use crate::process_manager::base::Process;

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl From<&ServiceDescriptor> for CommandSpec {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            cmd: descriptor.cmd.clone(),
            cwd: descriptor.cwd.clone(),
            env: descriptor
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProcId(pub u64);

pub struct Spawned {
    pub process: Box<dyn Process>,
    pub stdout: BoxStream<Vec<u8>>,
    pub stderr: BoxStream<Vec<u8>>,
}

impl Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawned")
            .field("process", &self.process)
            .field("stdout", &"<stream>")
            .field("stderr", &"<stream>")
            .finish()
    }
}
