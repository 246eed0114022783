use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use devdesk_config::DescriptorStore;
use devdesk_types::SupervisorSettings;
use futures::{
    future::{join_all, BoxFuture, Shared},
    FutureExt,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    probe::ReadinessProbe,
    process_manager::ProcessManager,
    supervisor::{
        background::{ServiceWorker, WorkerContext},
        events::SupervisorEvent,
        slot::{ServiceSlot, WorkerHandle},
    },
    types::{Phase, ServiceStatus},
};

/// Bound of the event channel returned by `Supervisor::new`. Events beyond
/// it are dropped rather than waited for.
const EVENTS_BOUND: usize = 1024;

/// Why a service did not reach `Ready` during `start`; names the service
/// that blocked.
#[derive(Debug, Clone)]
enum StartFailure {
    Timeout(String),
    Interrupted(String),
}

impl From<StartFailure> for Error {
    fn from(failure: StartFailure) -> Self {
        match failure {
            StartFailure::Timeout(service) => Error::DependencyTimeout { service },
            StartFailure::Interrupted(service) => Error::Interrupted { service },
        }
    }
}

type StartFuture = Shared<BoxFuture<'static, std::result::Result<(), StartFailure>>>;

/// Starts, watches, restarts and reports on a fixed set of services.
///
/// Every service has its own lock and its own background worker, so control
/// calls on unrelated services never wait on each other.
#[derive(Debug)]
pub struct Supervisor<P, R> {
    store: DescriptorStore,
    context: WorkerContext<P, R>,
    slots: BTreeMap<String, Arc<ServiceSlot>>,
}

impl<P, R> Supervisor<P, R>
where
    P: ProcessManager + 'static,
    R: ReadinessProbe + 'static,
{
    pub fn new(
        store: DescriptorStore,
        settings: SupervisorSettings,
        process_manager: P,
        prober: R,
    ) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENTS_BOUND);
        let slots = store
            .iter()
            .map(|descriptor| {
                (
                    descriptor.name.clone(),
                    Arc::new(ServiceSlot::new(
                        descriptor.clone(),
                        settings.log_capacity,
                        events_tx.clone(),
                    )),
                )
            })
            .collect();
        tracing::info!("Supervisor initialized with {} services", store.len());

        (
            Self {
                store,
                context: WorkerContext {
                    process_manager: Arc::new(process_manager),
                    prober: Arc::new(prober),
                    settings,
                },
                slots,
            },
            events_rx,
        )
    }

    #[must_use]
    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &SupervisorSettings {
        &self.context.settings
    }

    fn slot(&self, name: &str) -> Result<&Arc<ServiceSlot>> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_owned()))
    }

    /// Named services in start order, or every service if `names` is empty.
    fn select(&self, names: &[String]) -> Result<Vec<String>> {
        if let Some(unknown) = names.iter().find(|name| !self.slots.contains_key(*name)) {
            return Err(Error::ServiceNotFound(unknown.clone()));
        }
        Ok(self
            .store
            .order()
            .iter()
            .filter(|name| names.is_empty() || names.contains(name))
            .cloned()
            .collect())
    }

    /// Start services (all of them if `names` is empty) together with their
    /// dependencies. A service launches as soon as all of its own
    /// dependencies are `Ready`; already running services are left alone.
    ///
    /// # Errors
    /// `ServiceNotFound` for unknown names, `DependencyTimeout` naming the
    /// first service that did not become ready within its start timeout, or
    /// `Interrupted` if a concurrent stop cut the start short.
    pub async fn start(&self, names: &[String]) -> Result<()> {
        let order = if names.is_empty() {
            self.store.order().to_vec()
        } else {
            self.store.closure(names).map_err(Error::ServiceNotFound)?
        };
        tracing::info!("Starting services {order:?}");

        for name in &order {
            self.slot(name)?.mark_pending().await;
        }

        let mut started: HashMap<&str, StartFuture> = HashMap::with_capacity(order.len());
        for name in &order {
            let deps = self
                .store
                .dependencies_of(name)
                .iter()
                .map(|dep| {
                    started
                        .get(dep.as_str())
                        .cloned()
                        .ok_or_else(|| Error::Internal(format!("`{dep}` scheduled after `{name}`")))
                })
                .collect::<Result<Vec<_>>>()?;

            let slot = self.slot(name)?.clone();
            let context = self.context.clone();
            let future = async move {
                for dep in deps {
                    dep.await?;
                }
                ensure_started(slot, context).await
            }
            .boxed()
            .shared();
            started.insert(name, future);
        }

        let results = join_all(order.iter().filter_map(|name| started.remove(name.as_str()))).await;
        match results.into_iter().find_map(std::result::Result::err) {
            Some(failure) => {
                tracing::error!("Start failed: {failure:?}");
                Err(failure.into())
            }
            None => Ok(()),
        }
    }

    /// Stop services (all of them if `names` is empty), dependents first.
    ///
    /// # Errors
    /// `ServiceNotFound` for unknown names, or the first termination error;
    /// every selected service is still stopped.
    pub async fn stop(&self, names: &[String]) -> Result<()> {
        let order = self.select(names)?;
        tracing::info!("Stopping services {order:?}");

        let mut result = Ok(());
        for name in order.iter().rev() {
            let outcome = self.slot(name)?.stop(self.context.settings.stop_grace).await;
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Stop, clear the failure counters, and start again. This is the only
    /// way out of `Failed`.
    ///
    /// # Errors
    /// Any error of `stop` or `start`.
    pub async fn restart(&self, names: &[String]) -> Result<()> {
        self.stop(names).await?;
        for name in self.select(names)? {
            self.slot(&name)?.reset_failures().await;
        }
        self.start(names).await
    }

    /// Latest known status of every service. Never waits for an in-flight
    /// probe or restart.
    #[must_use]
    pub fn status(&self) -> BTreeMap<String, ServiceStatus> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.status()))
            .collect()
    }

    /// The buffered output of a service, oldest line first.
    ///
    /// # Errors
    /// `ServiceNotFound` for an unknown name.
    pub fn logs(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.slot(name)?.logs.lines())
    }

    /// Stop everything.
    ///
    /// # Errors
    /// The first termination error.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop(&[]).await
    }
}

/// Launch a service unless a worker already owns it, then wait until it is
/// `Ready`, `Failed` or stopped, bounded by its start timeout.
async fn ensure_started<P, R>(
    slot: Arc<ServiceSlot>,
    context: WorkerContext<P, R>,
) -> std::result::Result<(), StartFailure>
where
    P: ProcessManager + 'static,
    R: ReadinessProbe + 'static,
{
    let name = slot.name().to_owned();
    let mut status = slot.subscribe();

    {
        let _control = slot.control.lock().await;
        let mut state = slot.state.lock().await;
        match state.phase {
            Phase::Ready => return Ok(()),
            Phase::Starting | Phase::Degraded => {}
            Phase::Failed => return Err(StartFailure::Timeout(name)),
            // `start` moved every stopped service to `Pending` up front, so
            // this is a stop that arrived while waiting on dependencies.
            Phase::Stopped => return Err(StartFailure::Interrupted(name)),
            Phase::Pending => {
                let cancel = CancellationToken::new();
                let join = ServiceWorker::new(context, slot.clone(), cancel.clone()).spawn();
                state.worker = Some(WorkerHandle { cancel, join });
                slot.transition(&mut state, Phase::Starting);
            }
        }
    }

    let settled = tokio::time::timeout(
        slot.descriptor.start_timeout,
        status.wait_for(|s| {
            matches!(
                s.phase,
                Phase::Ready | Phase::Failed | Phase::Stopped | Phase::Pending
            )
        }),
    )
    .await
    .map(|waited| waited.map(|s| s.phase));

    match settled {
        Ok(Ok(Phase::Ready)) => Ok(()),
        Ok(Ok(Phase::Stopped | Phase::Pending) | Err(_)) => Err(StartFailure::Interrupted(name)),
        Ok(Ok(_)) | Err(_) => Err(StartFailure::Timeout(name)),
    }
}
