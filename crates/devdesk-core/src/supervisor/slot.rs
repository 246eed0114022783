use std::{sync::Arc, time::Duration, time::SystemTime};

use devdesk_types::ServiceDescriptor;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    log_tail::LogTail,
    process_manager::Process,
    supervisor::events::SupervisorEvent,
    types::{Phase, ServiceStatus},
};

#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

/// Mutable state of one service. Only reachable through `ServiceSlot::state`.
#[derive(Debug)]
pub(crate) struct ServiceState {
    pub phase: Phase,
    pub process: Option<Box<dyn Process>>,
    pub consecutive_failures: u32,
    pub last_transition: SystemTime,
    pub worker: Option<WorkerHandle>,
}

/// Everything the supervisor keeps per service.
///
/// Lock order is `control` before `state`; the background worker only ever
/// takes `state`, and never across a probe or a sleep.
#[derive(Debug)]
pub(crate) struct ServiceSlot {
    pub descriptor: Arc<ServiceDescriptor>,
    pub state: Mutex<ServiceState>,
    /// Serializes control-surface calls for this service.
    pub control: Mutex<()>,
    pub logs: LogTail,
    status: watch::Sender<ServiceStatus>,
    events: mpsc::Sender<SupervisorEvent>,
}

impl ServiceSlot {
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        log_capacity: usize,
        events: mpsc::Sender<SupervisorEvent>,
    ) -> Self {
        let now = SystemTime::now();
        let (status, _) = watch::channel(ServiceStatus {
            phase: Phase::Pending,
            consecutive_failures: 0,
            last_transition: now,
            pid: None,
        });

        Self {
            descriptor,
            state: Mutex::new(ServiceState {
                phase: Phase::Pending,
                process: None,
                consecutive_failures: 0,
                last_transition: now,
                worker: None,
            }),
            control: Mutex::new(()),
            logs: LogTail::new(log_capacity),
            status,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Latest published status. Never waits on the state lock.
    pub fn status(&self) -> ServiceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    /// Move to `phase` and publish. The caller holds the state lock.
    pub fn transition(&self, state: &mut ServiceState, phase: Phase) {
        if state.phase != phase {
            tracing::info!(
                service = %self.name(),
                failures = state.consecutive_failures,
                "{} -> {}",
                state.phase,
                phase
            );
            state.phase = phase;
            state.last_transition = SystemTime::now();
        }
        self.publish(state);
    }

    /// Publish `state` to status readers, emitting an event if it changed.
    pub fn publish(&self, state: &ServiceState) {
        let next = ServiceStatus {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            last_transition: state.last_transition,
            pid: state.process.as_ref().and_then(|process| process.pid()),
        };
        let previous = self.status.send_replace(next.clone());

        if previous.phase != next.phase
            || previous.consecutive_failures != next.consecutive_failures
        {
            let _ = self.events.try_send(SupervisorEvent::Phase {
                service: self.name().to_owned(),
                phase: next.phase,
                consecutive_failures: next.consecutive_failures,
            });
        }
    }

    pub fn record_output(&self, line: String) {
        let _ = self.events.try_send(SupervisorEvent::Log {
            service: self.name().to_owned(),
            line: line.clone(),
        });
        self.logs.push(line);
    }

    /// Put a stopped service back in line for starting.
    pub async fn mark_pending(&self) {
        let _control = self.control.lock().await;
        let mut state = self.state.lock().await;
        if state.phase == Phase::Stopped {
            self.transition(&mut state, Phase::Pending);
        }
    }

    pub async fn reset_failures(&self) {
        let _control = self.control.lock().await;
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        self.publish(&state);
    }

    /// Cancel the background worker, terminate the process and move to
    /// `Stopped`. No process of this service is alive afterwards.
    ///
    /// # Errors
    /// Returns an error if the process could not be terminated; the service is
    /// still marked stopped.
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        let _control = self.control.lock().await;

        let worker = self.state.lock().await.worker.take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(err) = worker.join.await {
                tracing::warn!(service = %self.name(), "Worker task ended abnormally: {err}");
            }
        }

        let process = self.state.lock().await.process.take();
        let mut result = Ok(());
        if let Some(mut process) = process {
            match process.terminate(grace).await {
                Ok(code) => {
                    tracing::info!(service = %self.name(), "Process exited with code {code}");
                }
                Err(err) => {
                    tracing::error!(service = %self.name(), "Failed to terminate process: {err}");
                    result = Err(err);
                }
            }
        }

        let mut state = self.state.lock().await;
        self.transition(&mut state, Phase::Stopped);
        result
    }
}
