use std::{
    fs, io,
    path::{Path, PathBuf},
};

use devdesk_types::{Probe, ProcessPattern};
use tokio::net::{lookup_host, TcpStream, UnixStream};

use crate::probe::{ProbeOutcome, ReadinessProbe};

pub const DEFAULT_X11_SOCKET_DIR: &str = "/tmp/.X11-unix";
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Probes against the local operating system.
///
/// Checks carry no timeout of their own; callers bound them.
#[derive(Debug, Clone)]
pub struct SystemProber {
    x11_socket_dir: PathBuf,
    proc_root: PathBuf,
}

impl Default for SystemProber {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProber {
    #[must_use]
    pub fn new() -> Self {
        Self {
            x11_socket_dir: PathBuf::from(DEFAULT_X11_SOCKET_DIR),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        }
    }

    #[must_use]
    pub fn with_x11_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.x11_socket_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    async fn check_port(host: &str, port: u16) -> ProbeOutcome {
        let addrs: Vec<_> = match lookup_host((host, port)).await {
            Ok(addrs) => addrs.collect(),
            Err(err) => return ProbeOutcome::Error(format!("cannot resolve `{host}`: {err}")),
        };
        if addrs.is_empty() {
            return ProbeOutcome::Error(format!("`{host}` resolved to no addresses"));
        }

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(_) => return ProbeOutcome::Ready,
                Err(err) => last_err = Some(err),
            }
        }

        ProbeOutcome::NotReady(match last_err {
            Some(err) => format!("{host}:{port} is not accepting connections: {err}"),
            None => format!("{host}:{port} is not accepting connections"),
        })
    }

    async fn check_display(&self, display: u32) -> ProbeOutcome {
        let socket = self.x11_socket_dir.join(format!("X{display}"));
        match UnixStream::connect(&socket).await {
            Ok(_) => ProbeOutcome::Ready,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                ProbeOutcome::NotReady(format!("no X server socket at {}", socket.display()))
            }
            Err(err) => ProbeOutcome::NotReady(format!(
                "display :{display} refused connection: {err}"
            )),
        }
    }

    async fn check_process(&self, pattern: &ProcessPattern) -> ProbeOutcome {
        let proc_root = self.proc_root.clone();
        let pattern = pattern.clone();
        let scan = tokio::task::spawn_blocking(move || {
            find_process(&proc_root, &pattern, std::process::id()).map(|found| (found, pattern))
        })
        .await;

        match scan {
            Ok(Ok((true, _))) => ProbeOutcome::Ready,
            Ok(Ok((false, pattern))) => {
                ProbeOutcome::NotReady(format!("no process matches /{pattern}/"))
            }
            Ok(Err(err)) => ProbeOutcome::Error(format!("cannot scan process table: {err}")),
            Err(err) => ProbeOutcome::Error(format!("process scan aborted: {err}")),
        }
    }
}

/// Scan `/proc`-style `root` for a command line matching `pattern`,
/// skipping `own_pid`.
fn find_process(root: &Path, pattern: &ProcessPattern, own_pid: u32) -> io::Result<bool> {
    for entry in fs::read_dir(root)? {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        // The process may have exited since the directory was listed.
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };

        let cmdline = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        if !cmdline.is_empty() && pattern.is_match(&cmdline) {
            return Ok(true);
        }
    }

    Ok(false)
}

#[async_trait::async_trait]
impl ReadinessProbe for SystemProber {
    async fn check(&self, probe: &Probe) -> ProbeOutcome {
        match probe {
            Probe::PortOpen { host, port } => Self::check_port(host, *port).await,
            Probe::DisplayQueryable { display } => self.check_display(*display).await,
            Probe::ProcessPatternRunning { pattern } => self.check_process(pattern).await,
        }
    }
}
