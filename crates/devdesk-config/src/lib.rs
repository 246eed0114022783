mod adapter;
mod raw;
mod store;

use devdesk_types::SupervisorSettings;

pub use store::DescriptorStore;

/// Error type for configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "toml")]
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error(s): {0}")]
    Validation(String),

    #[error("service `{0}` is declared more than once")]
    DuplicateService(String),

    #[error("service `{service}` depends on undeclared service `{dependency}`")]
    UnknownDependency { service: String, dependency: String },

    #[error("circular dependency between services: {}", .0.join(", "))]
    CircularDependency(Vec<String>),
}

/// A fully validated configuration: supervisor settings plus the
/// descriptor store.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: u32,
    pub settings: SupervisorSettings,
    pub store: DescriptorStore,
}

/// Load a configuration from a file path.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration file cannot be read or parsed.
pub fn load_from_path(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    tracing::debug!("Loaded config text from {}", path.display());
    parse_auto(&text, path)
}

/// Parse a configuration, picking the format from the file extension.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
pub fn parse_auto(text: &str, path: &std::path::Path) -> Result<Config, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml")]
        "toml" => parse_toml(text),
        _ => Err(ConfigError::Validation(format!(
            "unknown config extension `{ext}`"
        ))),
    }
}

/// Parse a TOML configuration.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
#[cfg(feature = "toml")]
pub fn parse_toml(config: &str) -> Result<Config, ConfigError> {
    let raw_config = toml::from_str::<raw::RawConfig>(config)?;
    raw_config.try_into()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use devdesk_types::Probe;

    use super::*;

    const DESKTOP: &str = r#"
        version = 1

        [supervisor]
        reconcile_interval_ms = 2000
        log_capacity = 50

        [[service]]
        name = "display"
        cmd = ["Xvfb", ":1", "-screen", "0", "1920x1080x24"]
        probe = { type = "display", display = 1 }

        [[service]]
        name = "remote-access"
        cmd = ["x11vnc", "-display", ":1", "-forever", "-rfbport", "5901"]
        deps = ["display"]
        env = { DISPLAY = ":1" }
        probe = { type = "port", port = 5901 }
        restart = { max_restarts = 3, backoff_base_ms = 1000 }

        [[service]]
        name = "editor"
        cmd = ["code-server", "--bind-addr", "0.0.0.0:8080"]
        start_timeout_ms = 60000
        probe = { type = "process", pattern = "code-server.*8080" }
    "#;

    #[test]
    fn parse_toml_ok() {
        let config = parse_toml(DESKTOP).unwrap();

        assert_eq!(config.version, 1);
        assert_eq!(config.settings.reconcile_interval, Duration::from_secs(2));
        assert_eq!(config.settings.log_capacity, 50);
        assert_eq!(config.settings.probe_timeout, Duration::from_secs(3));

        let remote = config.store.get("remote-access").unwrap();
        assert_eq!(remote.deps, vec!["display"]);
        assert_eq!(remote.env["DISPLAY"], ":1");
        assert_eq!(remote.restart.max_restarts, 3);
        assert_eq!(remote.restart.backoff_base, Duration::from_secs(1));
        assert_eq!(remote.restart.backoff_cap, Duration::from_secs(30));
        assert_eq!(
            remote.probe,
            Probe::PortOpen {
                host: "127.0.0.1".to_owned(),
                port: 5901
            }
        );

        let editor = config.store.get("editor").unwrap();
        assert_eq!(editor.start_timeout, Duration::from_secs(60));
        assert!(matches!(
            &editor.probe,
            Probe::ProcessPatternRunning { pattern } if pattern.as_str() == "code-server.*8080"
        ));
    }

    #[test]
    fn parse_rejects_cycle_before_anything_else() {
        let txt = r#"
            [[service]]
            name = "a"
            cmd = ["true"]
            deps = ["b"]
            probe = { type = "port", port = 1 }

            [[service]]
            name = "b"
            cmd = ["true"]
            deps = ["a"]
            probe = { type = "port", port = 2 }
        "#;

        let err = parse_toml(txt).unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency(ref names) if names == &["a", "b"]));
    }

    #[test]
    fn parse_rejects_unknown_probe_type() {
        let txt = r#"
            [[service]]
            name = "a"
            cmd = ["true"]
            probe = { type = "http", url = "http://localhost" }
        "#;

        assert!(matches!(parse_toml(txt), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn parse_auto_unknown_extension() {
        let result = parse_auto("", std::path::Path::new("devdesk.yaml"));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_sample_config() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../devdesk.toml");
        let config = load_from_path(&path).unwrap();

        assert_eq!(
            config.store.order(),
            ["display", "editor", "remote-access", "bridge"]
        );
        assert_eq!(config.store.get("remote-access").unwrap().restart.max_restarts, 10);
        assert_eq!(config.settings.log_capacity, 500);
    }
}
