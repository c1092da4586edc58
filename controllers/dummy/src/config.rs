//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Log output format (`LOG_FORMAT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    /// Maximum reconciles running in parallel
    pub concurrency: u16,
    /// Quiet period before a burst of events triggers a reconcile
    pub debounce: Duration,
    /// How often to re-check a Pod that is not running yet
    pub readiness_poll_interval: Duration,
    /// Fresh re-reads attempted after an optimistic concurrency conflict
    pub max_conflict_retries: u32,
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    /// Listen address for /healthz, /readyz and /metrics
    pub health_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: 3,
            debounce: Duration::from_secs(5),
            readiness_poll_interval: Duration::from_secs(10),
            max_conflict_retries: 3,
            backoff_min_minutes: 1,
            backoff_max_minutes: 10,
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Text,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ControllerError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{key} has invalid value '{raw}'"))
        }),
        None => Ok(default),
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let concurrency = parse(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let debounce_secs = parse(&lookup, "RECONCILE_DEBOUNCE_SECS", defaults.debounce.as_secs())?;
        let readiness_secs = parse(
            &lookup,
            "READINESS_POLL_SECS",
            defaults.readiness_poll_interval.as_secs(),
        )?;
        let max_conflict_retries =
            parse(&lookup, "MAX_CONFLICT_RETRIES", defaults.max_conflict_retries)?;

        let backoff_min_minutes = parse(&lookup, "BACKOFF_MIN_MINUTES", defaults.backoff_min_minutes)?;
        let backoff_max_minutes = parse(&lookup, "BACKOFF_MAX_MINUTES", defaults.backoff_max_minutes)?;
        if backoff_min_minutes == 0 || backoff_max_minutes < backoff_min_minutes {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff range {backoff_min_minutes}..{backoff_max_minutes} minutes is invalid"
            )));
        }

        let health_addr = parse(&lookup, "HEALTH_ADDR", defaults.health_addr)?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("" | "text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )));
            }
        };

        Ok(Self {
            namespace,
            concurrency,
            debounce: Duration::from_secs(debounce_secs),
            readiness_poll_interval: Duration::from_secs(readiness_secs),
            max_conflict_retries,
            backoff_min_minutes,
            backoff_max_minutes,
            health_addr,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = load(&[
            ("WATCH_NAMESPACE", "team-a"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("READINESS_POLL_SECS", "2"),
            ("MAX_CONFLICT_RETRIES", "5"),
            ("HEALTH_ADDR", "127.0.0.1:9000"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.readiness_poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.health_addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = load(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("RECONCILE_CONCURRENCY", "lots")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("RECONCILE_CONCURRENCY", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("BACKOFF_MIN_MINUTES", "5"), ("BACKOFF_MAX_MINUTES", "2")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
