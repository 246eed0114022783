use std::time::Duration;

use devdesk_types::{
    Probe, ProcessPattern, RestartPolicy, ServiceDescriptor, SupervisorSettings,
    DEFAULT_START_TIMEOUT,
};

use crate::{
    raw::{RawConfig, RawProbe, RawRestart, RawService, RawSupervisor},
    Config, ConfigError, DescriptorStore,
};

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw_config: RawConfig) -> Result<Self, Self::Error> {
        let settings = raw_config
            .supervisor
            .unwrap_or_default()
            .into_settings()?;

        let descriptors = raw_config
            .services
            .into_iter()
            .map(RawService::into_descriptor)
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Config {
            version: raw_config.version,
            settings,
            store: DescriptorStore::load(descriptors)?,
        })
    }
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

impl RawSupervisor {
    fn into_settings(self) -> Result<SupervisorSettings, ConfigError> {
        let defaults = SupervisorSettings::default();
        let settings = SupervisorSettings {
            reconcile_interval: millis(self.reconcile_interval_ms, defaults.reconcile_interval),
            probe_timeout: millis(self.probe_timeout_ms, defaults.probe_timeout),
            ready_poll_interval: millis(self.ready_poll_interval_ms, defaults.ready_poll_interval),
            stop_grace: millis(self.stop_grace_ms, defaults.stop_grace),
            log_capacity: self.log_capacity.unwrap_or(defaults.log_capacity),
        };

        if settings.reconcile_interval.is_zero() || settings.ready_poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "supervisor: polling intervals must be positive".into(),
            ));
        }
        if settings.probe_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "supervisor: probe_timeout_ms must be positive".into(),
            ));
        }
        if settings.log_capacity == 0 {
            return Err(ConfigError::Validation(
                "supervisor: log_capacity must be at least 1".into(),
            ));
        }

        Ok(settings)
    }
}

impl RawService {
    fn into_descriptor(self) -> Result<ServiceDescriptor, ConfigError> {
        let name = self.name;
        if name.trim().is_empty() {
            return Err(ConfigError::Validation("service name is empty".into()));
        }
        if self.cmd.is_empty() {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: cmd is empty"
            )));
        }
        if self.cmd.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: cmd contains empty element"
            )));
        }

        let probe = self.probe.into_probe(&name)?;
        let restart = self.restart.unwrap_or_default().into_policy(&name)?;

        Ok(ServiceDescriptor {
            cmd: self.cmd,
            cwd: self.cwd.map(Into::into),
            env: self.env.unwrap_or_default(),
            deps: self.deps.unwrap_or_default(),
            probe,
            restart,
            start_timeout: millis(self.start_timeout_ms, DEFAULT_START_TIMEOUT),
            name,
        })
    }
}

impl RawProbe {
    fn into_probe(self, service: &str) -> Result<Probe, ConfigError> {
        match self {
            RawProbe::Port { port: 0, .. } => Err(ConfigError::Validation(format!(
                "service `{service}`: probe port must be non-zero"
            ))),
            RawProbe::Port { host, port } => Ok(Probe::PortOpen { host, port }),
            RawProbe::Display { display } => Ok(Probe::DisplayQueryable { display }),
            RawProbe::Process { pattern } => ProcessPattern::new(&pattern)
                .map(|pattern| Probe::ProcessPatternRunning { pattern })
                .map_err(|err| {
                    ConfigError::Validation(format!(
                        "service `{service}`: invalid process pattern: {err}"
                    ))
                }),
        }
    }
}

impl RawRestart {
    fn into_policy(self, service: &str) -> Result<RestartPolicy, ConfigError> {
        let defaults = RestartPolicy::default();
        let policy = RestartPolicy {
            max_restarts: self.max_restarts.unwrap_or(defaults.max_restarts),
            backoff_base: millis(self.backoff_base_ms, defaults.backoff_base),
            backoff_cap: millis(self.backoff_cap_ms, defaults.backoff_cap),
        };

        if policy.backoff_base > policy.backoff_cap {
            return Err(ConfigError::Validation(format!(
                "service `{service}`: backoff_base_ms exceeds backoff_cap_ms"
            )));
        }

        Ok(policy)
    }
}
