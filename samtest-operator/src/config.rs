//! Operator runtime configuration.

use crate::error::{OperatorError, OperatorResult};
use std::env;
use std::time::Duration;

/// Default controller name, also used as field manager and event reporter.
pub const DEFAULT_CONTROLLER_NAME: &str = "samtest-operator";

/// Runtime settings of the operator binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Controller name. Field manager for writes and reporting controller of events.
    pub controller_name: String,
    /// Instance reported on events, usually the pod name.
    pub instance: Option<String>,
    /// Namespace to watch. `None` watches every namespace.
    pub watch_namespace: Option<String>,
    /// Delay before retrying a failed pass.
    pub error_requeue: Duration,
    /// Periodic resync of Ready records. `None` waits for changes only.
    pub resync: Option<Duration>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            instance: None,
            watch_namespace: None,
            error_requeue: Duration::from_secs(30),
            resync: None,
        }
    }
}

impl OperatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SAMTEST_CONTROLLER_NAME`: controller name (default `samtest-operator`)
    /// - `POD_NAME`: event reporter instance
    /// - `WATCH_NAMESPACE`: restrict the watch to one namespace
    /// - `SAMTEST_ERROR_REQUEUE_SECS`: retry delay after a failed pass (default 30)
    /// - `SAMTEST_RESYNC_SECS`: periodic resync interval, 0 or unset disables it
    pub fn from_env() -> OperatorResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OperatorResult<Self> {
        let defaults = Self::default();
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let error_requeue = match present("SAMTEST_ERROR_REQUEUE_SECS") {
            Some(raw) => match parse_secs("SAMTEST_ERROR_REQUEUE_SECS", &raw)? {
                0 => {
                    return Err(OperatorError::InvalidConfig(
                        "SAMTEST_ERROR_REQUEUE_SECS must be greater than 0".into(),
                    ));
                }
                secs => Duration::from_secs(secs),
            },
            None => defaults.error_requeue,
        };

        let resync = match present("SAMTEST_RESYNC_SECS") {
            Some(raw) => match parse_secs("SAMTEST_RESYNC_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        Ok(Self {
            controller_name: present("SAMTEST_CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            instance: present("POD_NAME"),
            watch_namespace: present("WATCH_NAMESPACE"),
            error_requeue,
            resync,
        })
    }
}

fn parse_secs(key: &str, raw: &str) -> OperatorResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        OperatorError::InvalidConfig(format!("{key} must be a whole number of seconds, got {raw:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> OperatorResult<OperatorConfig> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        OperatorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_without_variables() {
        let config = from(&[]).unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.controller_name, "samtest-operator");
        assert_eq!(config.error_requeue, Duration::from_secs(30));
        assert!(config.resync.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = from(&[
            ("SAMTEST_CONTROLLER_NAME", "custom"),
            ("POD_NAME", "operator-0"),
            ("WATCH_NAMESPACE", "apps"),
            ("SAMTEST_ERROR_REQUEUE_SECS", "5"),
            ("SAMTEST_RESYNC_SECS", "600"),
        ])
        .unwrap();

        assert_eq!(config.controller_name, "custom");
        assert_eq!(config.instance.as_deref(), Some("operator-0"));
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
        assert_eq!(config.error_requeue, Duration::from_secs(5));
        assert_eq!(config.resync, Some(Duration::from_secs(600)));
    }

    #[test]
    fn empty_namespace_means_all() {
        let config = from(&[("WATCH_NAMESPACE", "")]).unwrap();
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn zero_resync_disables_it() {
        let config = from(&[("SAMTEST_RESYNC_SECS", "0")]).unwrap();
        assert!(config.resync.is_none());
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(matches!(
            from(&[("SAMTEST_ERROR_REQUEUE_SECS", "soon")]),
            Err(OperatorError::InvalidConfig(_))
        ));
        assert!(matches!(
            from(&[("SAMTEST_ERROR_REQUEUE_SECS", "0")]),
            Err(OperatorError::InvalidConfig(_))
        ));
    }
}
