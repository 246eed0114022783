use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use regex::Regex;

/// Immutable definition of a managed service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub deps: Vec<String>,
    pub probe: Probe,
    pub restart: RestartPolicy,
    pub start_timeout: Duration,
}

/// How to decide that a service is actually serving.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    PortOpen { host: String, port: u16 },
    DisplayQueryable { display: u32 },
    ProcessPatternRunning { pattern: ProcessPattern },
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::PortOpen { host, port } => write!(f, "port {host}:{port}"),
            Probe::DisplayQueryable { display } => write!(f, "display :{display}"),
            Probe::ProcessPatternRunning { pattern } => write!(f, "process /{pattern}/"),
        }
    }
}

/// A command-line pattern compiled once at load time.
#[derive(Debug, Clone)]
pub struct ProcessPattern(Regex);

impl ProcessPattern {
    /// Compile a pattern.
    ///
    /// # Errors
    /// Returns the regex error if `pattern` is not a valid expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    #[must_use]
    pub fn is_match(&self, cmdline: &str) -> bool {
        self.0.is_match(cmdline)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for ProcessPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for ProcessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RestartPolicy {
    /// Delay before relaunching after the `failures`-th consecutive failure:
    /// `min(base * 2^failures, cap)`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .map_or(self.backoff_cap, |delay| delay.min(self.backoff_cap))
    }

    /// Whether `failures` consecutive failures exhaust the policy.
    #[must_use]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_restarts
    }
}

/// Supervisor-wide timing and buffer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub reconcile_interval: Duration,
    pub probe_timeout: Duration,
    pub ready_poll_interval: Duration,
    pub stop_grace: Duration,
    pub log_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
            ready_poll_interval: Duration::from_millis(250),
            stop_grace: Duration::from_secs(5),
            log_capacity: 200,
        }
    }
}

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);
