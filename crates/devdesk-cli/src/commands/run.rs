use std::{io::Write, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use devdesk_config::load_from_path;
use devdesk_core::{Phase, Supervisor, SupervisorEvent, SystemProber, UnixProcessManager};
use tokio::{
    signal,
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};

use crate::{commands::resolve_file, logger::Logger};

type DeskSupervisor = Supervisor<UnixProcessManager, SystemProber>;

pub async fn run(file: Option<String>, services: Vec<String>, heal_every: Option<u64>) -> Result<()> {
    let path = resolve_file(file);
    let config = load_from_path(&path)
        .with_context(|| format!("invalid configuration `{}`", path.display()))?;

    if let Some(unknown) = services.iter().find(|name| config.store.get(name).is_none()) {
        return Err(anyhow!("Service {unknown} not found"));
    }

    let (supervisor, mut events) = Supervisor::new(
        config.store,
        config.settings,
        UnixProcessManager::new(),
        SystemProber::new(),
    );
    let supervisor = Arc::new(supervisor);

    let mut starting = Some({
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.start(&services).await })
    });
    let mut stopping: Option<JoinHandle<devdesk_core::Result<()>>> = None;
    let mut heal = heal_every.map(|secs| {
        let period = Duration::from_secs(secs);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    let mut logger = Logger::default();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                if stopping.is_some() {
                    tracing::warn!("Second Ctrl+C: exiting immediately");
                    return Ok(());
                }

                tracing::info!("Ctrl+C: stopping services...");
                heal = None;
                if let Some(start) = starting.take() {
                    start.abort();
                }
                stopping = Some(spawn_shutdown(&supervisor));
            }

            started = finished(&mut starting) => {
                if let Some(err) = report_start(&mut logger, started, heal.is_some()) {
                    if let Err(err) = supervisor.shutdown().await {
                        tracing::error!("Failed to stop services: {err}");
                    }
                    return Err(err);
                }
            }

            stopped = finished(&mut stopping) => {
                return match stopped {
                    Some(Ok(())) => {
                        logger.system("All services stopped");
                        Ok(())
                    }
                    Some(Err(err)) => Err(err.into()),
                    None => Err(anyhow!("shutdown task ended abnormally")),
                };
            }

            () = tick(&mut heal) => heal_failed(&supervisor),

            event = events.recv() => match event {
                Some(SupervisorEvent::Log { service, line }) => logger.log(&service, &line),
                Some(SupervisorEvent::Phase { service, phase, consecutive_failures }) => {
                    if consecutive_failures > 0 {
                        logger.system(&format!("{service}: {phase} ({consecutive_failures} consecutive failures)"));
                    } else {
                        logger.system(&format!("{service}: {phase}"));
                    }
                }
                None => {
                    tracing::info!("Event stream ended");
                    return Ok(());
                }
            },
        }
    }
}

/// Report the outcome of the initial start. Returns the error that ends the
/// run; with healing enabled the run goes on and failed services are retried.
fn report_start<W: Write>(
    logger: &mut Logger<W>,
    started: Option<devdesk_core::Result<()>>,
    healing: bool,
) -> Option<anyhow::Error> {
    match started {
        Some(Ok(())) => {
            logger.system("All requested services are ready");
            None
        }
        Some(Err(err)) if healing => {
            logger.error(&format!("Start failed: {err}; failed services will be restarted"));
            None
        }
        Some(Err(err)) => {
            logger.error(&format!("Start failed: {err}"));
            Some(err.into())
        }
        None => {
            tracing::warn!("Start task ended abnormally");
            None
        }
    }
}

fn spawn_shutdown(supervisor: &Arc<DeskSupervisor>) -> JoinHandle<devdesk_core::Result<()>> {
    let supervisor = supervisor.clone();
    tokio::spawn(async move { supervisor.shutdown().await })
}

/// Restart every service that gave up.
fn heal_failed(supervisor: &Arc<DeskSupervisor>) {
    let failed: Vec<String> = supervisor
        .status()
        .into_iter()
        .filter(|(_, status)| status.phase == Phase::Failed)
        .map(|(name, _)| name)
        .collect();
    if failed.is_empty() {
        return;
    }

    tracing::info!("Restarting failed services {failed:?}");
    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        if let Err(err) = supervisor.restart(&failed).await {
            tracing::warn!("Restart of {failed:?} did not complete: {err}");
        }
    });
}

/// Output of `task` once it finishes. Pending forever if there is no task.
async fn finished<T>(task: &mut Option<JoinHandle<T>>) -> Option<T> {
    let Some(handle) = task else {
        return std::future::pending().await;
    };
    let output = handle.await.ok();
    *task = None;
    output
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
