use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

use crate::admission::ShadowingScope;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {variable}: {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    pub webhook_bind_address: SocketAddr,
    pub reconcile_timeout: Duration,
    pub concurrent_syncs: u16,
    pub cache_sync_timeout: Duration,
    pub shadowing_scope: ShadowingScope,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            webhook_bind_address: SocketAddr::from(([0, 0, 0, 0], 8443)),
            reconcile_timeout: Duration::from_secs(180),
            concurrent_syncs: 5,
            cache_sync_timeout: Duration::from_secs(10),
            shadowing_scope: ShadowingScope::MachineTypes,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            webhook_bind_address: parse(&lookup, "WEBHOOK_BIND_ADDRESS")?
                .unwrap_or(defaults.webhook_bind_address),
            reconcile_timeout: parse(&lookup, "RECONCILE_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_timeout),
            concurrent_syncs: parse(&lookup, "CONCURRENT_SYNCS")?
                .unwrap_or(defaults.concurrent_syncs),
            cache_sync_timeout: parse(&lookup, "CACHE_SYNC_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_sync_timeout),
            shadowing_scope: parse(&lookup, "SHADOWING_SCOPE")?
                .unwrap_or(defaults.shadowing_scope),
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(variable).filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| ConfigError::Invalid {
            variable,
            reason: err.to_string(),
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn falls_back_to_defaults() {
        assert_eq!(
            OperatorConfig::from_lookup(lookup(&[])).unwrap(),
            OperatorConfig::default()
        );
    }

    #[test]
    fn reads_every_variable() {
        let config = OperatorConfig::from_lookup(lookup(&[
            ("WEBHOOK_BIND_ADDRESS", "127.0.0.1:9443"),
            ("RECONCILE_TIMEOUT_SECONDS", "30"),
            ("CONCURRENT_SYNCS", "12"),
            ("CACHE_SYNC_TIMEOUT_SECONDS", "3"),
            ("SHADOWING_SCOPE", "all"),
        ]))
        .unwrap();
        assert_eq!(config.webhook_bind_address, "127.0.0.1:9443".parse().unwrap());
        assert_eq!(config.reconcile_timeout, Duration::from_secs(30));
        assert_eq!(config.concurrent_syncs, 12);
        assert_eq!(config.cache_sync_timeout, Duration::from_secs(3));
        assert_eq!(config.shadowing_scope, ShadowingScope::All);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = OperatorConfig::from_lookup(lookup(&[("CONCURRENT_SYNCS", "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { variable: "CONCURRENT_SYNCS", .. }
        ));
        assert!(OperatorConfig::from_lookup(lookup(&[("SHADOWING_SCOPE", "regions")])).is_err());
    }
}
