use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::Instant};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    error::{Error, Result},
    process_manager::{CommandSpec, ProcId, Process, ProcessManager, Spawned},
};

#[derive(Debug)]
struct MockRecord {
    alive: Arc<AtomicBool>,
    spawned_at: Instant,
    stdout: mpsc::Sender<Vec<u8>>,
}

/// Shared, inspectable state behind the mock process manager and mock prober.
#[derive(Debug, Default)]
pub(crate) struct MockWorld {
    next_id: AtomicU64,
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
    records: Mutex<HashMap<String, Vec<MockRecord>>>,
    failing: Mutex<HashSet<String>>,
    never_ready: Mutex<HashSet<String>>,
    hung: Mutex<HashSet<String>>,
    ready_delay: Mutex<HashMap<String, Duration>>,
}

impl MockWorld {
    pub fn fail_spawns(&self, name: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            set.insert(name.to_owned());
        } else {
            set.remove(name);
        }
    }

    pub fn never_ready(&self, name: &str) {
        self.set_serving(name, false);
    }

    /// Make the readiness check of `name` report not ready, or serve again, without
    /// touching its process.
    pub fn set_serving(&self, name: &str, serving: bool) {
        let mut set = self
            .never_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if serving {
            set.remove(name);
        } else {
            set.insert(name.to_owned());
        }
    }

    /// Make every readiness check of `name` hang until released.
    pub fn set_hung(&self, name: &str, hung: bool) {
        let mut set = self.hung.lock().unwrap_or_else(PoisonError::into_inner);
        if hung {
            set.insert(name.to_owned());
        } else {
            set.remove(name);
        }
    }

    pub fn is_hung(&self, name: &str) -> bool {
        self.hung
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn ready_after(&self, name: &str, delay: Duration) {
        self.ready_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), delay);
    }

    /// Spawn attempts, including failed ones.
    pub fn attempts(&self, name: &str) -> usize {
        self.attempt_times(name).len()
    }

    pub fn attempt_times(&self, name: &str) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn spawn_times(&self, name: &str) -> Vec<Instant> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|records| records.iter().map(|r| r.spawned_at).collect())
            .unwrap_or_default()
    }

    pub fn any_alive(&self, name: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|records| records.iter().any(|r| r.alive.load(Ordering::SeqCst)))
    }

    /// Simulate the latest process of `name` dying outside the supervisor.
    pub fn kill_external(&self, name: &str) {
        if let Some(record) = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|records| records.last())
        {
            record.alive.store(false, Ordering::SeqCst);
        }
    }

    pub async fn emit(&self, name: &str, output: &str) {
        let sender = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|records| records.last())
            .map(|record| record.stdout.clone());
        if let Some(sender) = sender {
            let _ = sender.send(output.as_bytes().to_vec()).await;
        }
    }

    /// Ready when the latest process is alive and its startup delay passed.
    pub fn is_ready(&self, name: &str) -> bool {
        if self
            .never_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
        {
            return false;
        }
        let delay = self
            .ready_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or_default();

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|records| records.last())
            .is_some_and(|record| {
                record.alive.load(Ordering::SeqCst) && record.spawned_at + delay <= Instant::now()
            })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockProcessManager {
    world: Arc<MockWorld>,
}

impl MockProcessManager {
    pub fn world(&self) -> Arc<MockWorld> {
        self.world.clone()
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn spawn(&self, spec: CommandSpec) -> Result<Spawned> {
        self.world
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(spec.name.clone())
            .or_default()
            .push(Instant::now());

        if self
            .world
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&spec.name)
        {
            return Err(Error::Launch {
                service: spec.name,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let alive = Arc::new(AtomicBool::new(true));
        let (stdout_tx, stdout) = mpsc::channel(16);
        let (_, stderr) = mpsc::channel(1);
        self.world
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(spec.name)
            .or_default()
            .push(MockRecord {
                alive: alive.clone(),
                spawned_at: Instant::now(),
                stdout: stdout_tx,
            });

        Ok(Spawned {
            process: Box::new(MockProcess {
                id: ProcId(self.world.next_id.fetch_add(1, Ordering::Relaxed)),
                alive,
            }),
            stdout: Box::pin(ReceiverStream::new(stdout)),
            stderr: Box::pin(ReceiverStream::new(stderr)),
        })
    }
}

#[derive(Debug)]
struct MockProcess {
    id: ProcId,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl Process for MockProcess {
    fn id(&self) -> ProcId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self, d: Duration) -> Result<Option<i32>> {
        if self.is_alive() {
            tokio::time::sleep(d).await;
        }
        Ok((!self.is_alive()).then_some(0))
    }

    async fn kill(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}
