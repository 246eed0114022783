use std::{
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures::StreamExt;
use libc::{killpg, setsid, SIGKILL, SIGTERM};
use tokio::{
    io::BufReader,
    process::{Child, Command},
    time::timeout,
};
use tokio_util::io::ReaderStream;

use crate::{
    error::{Error, Result},
    process_manager::{
        base::{Process, ProcessManager},
        types::{CommandSpec, ProcId, Spawned},
    },
};

#[derive(Debug)]
struct UnixProcess {
    id: ProcId,
    pid: Option<u32>,
    child: Child,
    pgid: libc::pid_t,
}

/// Unix-specific process manager.
///
/// Every process is started as the leader of a new session, so signals are
/// delivered to its whole process group.
#[derive(Debug, Default)]
pub struct UnixProcessManager {
    next_id: AtomicU64,
}

impl UnixProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or_default()
}

fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    #[allow(unsafe_code)]
    let rc = unsafe { killpg(pgid, signal) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        // The group is already gone.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(Error::IOError(err));
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProcessManager for UnixProcessManager {
    async fn spawn(&self, spec: CommandSpec) -> Result<Spawned> {
        let Some((program, args)) = spec.cmd.split_first() else {
            return Err(Error::Launch {
                service: spec.name,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            service: spec.name.clone(),
            source,
        })?;

        let pid = child.id();
        let pgid = pid
            .and_then(|pid| libc::pid_t::try_from(pid).ok())
            .ok_or_else(|| Error::IOError(std::io::Error::other("pid not available")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::IOError(std::io::Error::other("stdout not piped")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::IOError(std::io::Error::other("stderr not piped")))?;

        let out_stream = ReaderStream::new(BufReader::new(stdout))
            .filter_map(|res| async move { res.ok().map(|b| b.to_vec()) });
        let err_stream = ReaderStream::new(BufReader::new(stderr))
            .filter_map(|res| async move { res.ok().map(|b| b.to_vec()) });

        let id = ProcId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Spawned `{}` as {id:?} (pid {pid:?})", spec.name);

        Ok(Spawned {
            process: Box::new(UnixProcess {
                id,
                pid,
                child,
                pgid,
            }),
            stdout: Box::pin(out_stream),
            stderr: Box::pin(err_stream),
        })
    }
}

#[async_trait::async_trait]
impl Process for UnixProcess {
    fn id(&self) -> ProcId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn shutdown(&mut self) -> Result<()> {
        signal_group(self.pgid, SIGTERM)
    }

    async fn wait(&mut self, d: Duration) -> Result<Option<i32>> {
        match timeout(d, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Some(exit_code(status))),
            Ok(Err(err)) => Err(Error::IOError(err)),
            Err(_) => Ok(None),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        signal_group(self.pgid, SIGKILL)
    }
}
