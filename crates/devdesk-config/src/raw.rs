use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub supervisor: Option<RawSupervisor>,
    #[serde(default, rename = "service")]
    pub services: Vec<RawService>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSupervisor {
    pub reconcile_interval_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub ready_poll_interval_ms: Option<u64>,
    pub stop_grace_ms: Option<u64>,
    pub log_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawService {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub deps: Option<Vec<String>>,
    pub start_timeout_ms: Option<u64>,
    pub probe: RawProbe,
    pub restart: Option<RawRestart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum RawProbe {
    Port {
        #[serde(default = "default_host")]
        host: String,
        port: u16,
    },
    Display {
        display: u32,
    },
    Process {
        pattern: String,
    },
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRestart {
    pub max_restarts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
}
