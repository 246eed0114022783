use std::{future::Future, sync::Arc};

use devdesk_types::SupervisorSettings;
use futures::StreamExt;
use tokio::{
    task::JoinHandle,
    time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    log_tail::LineAssembler,
    probe::{ProbeOutcome, ReadinessProbe},
    process_manager::{BoxStream, CommandSpec, ProcessManager},
    supervisor::slot::ServiceSlot,
    types::Phase,
};

/// What the supervisor hands to every background worker.
#[derive(Debug)]
pub(crate) struct WorkerContext<P, R> {
    pub process_manager: Arc<P>,
    pub prober: Arc<R>,
    pub settings: SupervisorSettings,
}

impl<P, R> Clone for WorkerContext<P, R> {
    fn clone(&self) -> Self {
        Self {
            process_manager: self.process_manager.clone(),
            prober: self.prober.clone(),
            settings: self.settings,
        }
    }
}

enum Verdict {
    Healthy,
    Failure(String),
    Cancelled,
}

/// Long-lived task that launches one service, waits for it to become ready
/// and then reconciles it on a fixed interval until cancelled or failed.
pub(crate) struct ServiceWorker<P, R> {
    context: WorkerContext<P, R>,
    slot: Arc<ServiceSlot>,
    cancel: CancellationToken,
}

impl<P, R> ServiceWorker<P, R>
where
    P: ProcessManager + 'static,
    R: ReadinessProbe + 'static,
{
    pub fn new(
        context: WorkerContext<P, R>,
        slot: Arc<ServiceSlot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            slot,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        loop {
            let verdict = match self.launch().await {
                Ok(()) => match self.await_ready().await {
                    Verdict::Healthy => self.reconcile().await,
                    other => other,
                },
                Err(err) => Verdict::Failure(err.to_string()),
            };

            let Verdict::Failure(reason) = verdict else {
                tracing::debug!(service = %self.slot.name(), "Worker cancelled");
                return;
            };
            if !self.recover(&reason).await {
                return;
            }
        }
    }

    /// Run `future` unless the worker is cancelled first.
    async fn cancellable<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            () = self.cancel.cancelled() => None,
            output = future => Some(output),
        }
    }

    async fn launch(&self) -> Result<()> {
        let spawned = self
            .context
            .process_manager
            .spawn(CommandSpec::from(self.slot.descriptor.as_ref()))
            .await?;

        spawn_drain(spawned.stdout, self.slot.clone());
        spawn_drain(spawned.stderr, self.slot.clone());

        let pid = spawned.process.pid();
        let mut state = self.slot.state.lock().await;
        state.process = Some(spawned.process);
        self.slot.publish(&state);
        tracing::info!(service = %self.slot.name(), ?pid, "Launched");

        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let mut state = self.slot.state.lock().await;
        state
            .process
            .as_mut()
            .is_some_and(|process| process.is_alive())
    }

    async fn probe(&self) -> ProbeOutcome {
        let probe = &self.slot.descriptor.probe;
        let outcome = match timeout(
            self.context.settings.probe_timeout,
            self.context.prober.check(probe),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Error(format!(
                "{probe} timed out after {:?}",
                self.context.settings.probe_timeout
            )),
        };

        match &outcome {
            ProbeOutcome::Ready => {}
            ProbeOutcome::NotReady(reason) => {
                tracing::debug!(service = %self.slot.name(), "Not ready: {reason}");
            }
            ProbeOutcome::Error(reason) => {
                tracing::warn!(service = %self.slot.name(), "Probe error: {reason}");
            }
        }
        outcome
    }

    async fn mark_ready(&self) {
        let mut state = self.slot.state.lock().await;
        state.consecutive_failures = 0;
        self.slot.transition(&mut state, Phase::Ready);
    }

    async fn await_ready(&self) -> Verdict {
        let start_timeout = self.slot.descriptor.start_timeout;
        let deadline = Instant::now() + start_timeout;

        loop {
            if !self.is_alive().await {
                return Verdict::Failure("process exited before becoming ready".to_owned());
            }
            match self.cancellable(self.probe()).await {
                None => return Verdict::Cancelled,
                Some(outcome) if outcome.is_ready() => {
                    self.mark_ready().await;
                    return Verdict::Healthy;
                }
                Some(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Verdict::Failure(format!("not ready within {start_timeout:?}"));
            }
            let next_poll = (now + self.context.settings.ready_poll_interval).min(deadline);
            if self.cancellable(sleep_until(next_poll)).await.is_none() {
                return Verdict::Cancelled;
            }
        }
    }

    async fn reconcile(&self) -> Verdict {
        let period = self.context.settings.reconcile_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.cancellable(ticker.tick()).await.is_none() {
                return Verdict::Cancelled;
            }
            if !self.is_alive().await {
                return Verdict::Failure("process is no longer running".to_owned());
            }
            match self.cancellable(self.probe()).await {
                None => return Verdict::Cancelled,
                Some(ProbeOutcome::Ready) => self.mark_ready().await,
                Some(outcome) => return Verdict::Failure(outcome.to_string()),
            }
        }
    }

    /// Count a failure, tear the process down and wait out the backoff.
    /// Returns `false` once the worker should exit.
    async fn recover(&self, reason: &str) -> bool {
        let policy = self.slot.descriptor.restart;
        let (process, failures, exhausted) = {
            let mut state = self.slot.state.lock().await;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let failures = state.consecutive_failures;
            let exhausted = policy.is_exhausted(failures);
            let process = state.process.take();
            let phase = if exhausted {
                Phase::Failed
            } else {
                Phase::Degraded
            };
            self.slot.transition(&mut state, phase);
            (process, failures, exhausted)
        };
        tracing::warn!(service = %self.slot.name(), failures, "{reason}");

        if let Some(mut process) = process {
            if let Err(err) = process.terminate(self.context.settings.stop_grace).await {
                tracing::error!(service = %self.slot.name(), "Failed to terminate process: {err}");
            }
        }

        if exhausted {
            tracing::error!(
                service = %self.slot.name(),
                "Giving up after {failures} consecutive failures"
            );
            return false;
        }

        let delay = policy.delay(failures);
        tracing::info!(service = %self.slot.name(), ?delay, "Relaunching after backoff");
        self.cancellable(sleep(delay)).await.is_some()
    }
}

/// Drain one output stream into the service's log tail. Never applies
/// backpressure to the process: the tail evicts instead of waiting.
fn spawn_drain(mut output: BoxStream<Vec<u8>>, slot: Arc<ServiceSlot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut assembler = LineAssembler::default();
        while let Some(chunk) = output.next().await {
            for line in assembler.feed(&chunk) {
                slot.record_output(line);
            }
        }
        if let Some(line) = assembler.finish() {
            slot.record_output(line);
        }
    })
}
