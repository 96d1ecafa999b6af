//! Configuration types for the handshake core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, TxGuardError, constants};

/// TTL and lock policy shared by a store, a lock and an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Build-phase TTL; also the age at which the sweep reclaims a record.
    pub build_ttl_secs: u64,
    /// Confirm-phase TTL override. Must be `<= build_ttl_secs`.
    pub confirm_ttl_secs: u64,
    /// Interval between background sweeps.
    pub sweep_interval_secs: u64,
    /// Bounded wait for the resource lock. `None` waits indefinitely.
    pub lock_timeout_ms: Option<u64>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            build_ttl_secs: constants::DEFAULT_BUILD_TTL_SECS,
            confirm_ttl_secs: constants::DEFAULT_CONFIRM_TTL_SECS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            lock_timeout_ms: None,
        }
    }
}

impl HandshakeConfig {
    #[must_use]
    pub fn build_ttl(&self) -> Duration {
        Duration::from_secs(self.build_ttl_secs)
    }

    #[must_use]
    pub fn confirm_ttl(&self) -> Duration {
        Duration::from_secs(self.confirm_ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns [`TxGuardError::Configuration`] if any interval is zero or the
    /// confirm window is longer than the build window.
    pub fn validate(&self) -> Result<()> {
        if self.build_ttl_secs == 0 || self.confirm_ttl_secs == 0 {
            return Err(TxGuardError::Configuration(
                "TTLs must be greater than zero".to_string(),
            ));
        }
        if self.confirm_ttl_secs > self.build_ttl_secs {
            return Err(TxGuardError::Configuration(format!(
                "confirm TTL ({}s) must not exceed build TTL ({}s)",
                self.confirm_ttl_secs, self.build_ttl_secs
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(TxGuardError::Configuration(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms == Some(0) {
            return Err(TxGuardError::Configuration(
                "lock timeout must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `TXGUARD_*` environment variables, validated.
    ///
    /// # Errors
    /// Returns [`TxGuardError::Configuration`] on a non-numeric value or an
    /// inconsistent result.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns, validated.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parse = |name: &str| -> Result<Option<u64>> {
            lookup(name)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|e| {
                        TxGuardError::Configuration(format!("{name}={raw:?} is not a number: {e}"))
                    })
                })
                .transpose()
        };

        let mut config = Self::default();
        if let Some(v) = parse(constants::ENV_BUILD_TTL_SECS)? {
            config.build_ttl_secs = v;
        }
        if let Some(v) = parse(constants::ENV_CONFIRM_TTL_SECS)? {
            config.confirm_ttl_secs = v;
        }
        if let Some(v) = parse(constants::ENV_SWEEP_INTERVAL_SECS)? {
            config.sweep_interval_secs = v;
        }
        if let Some(v) = parse(constants::ENV_LOCK_TIMEOUT_MS)? {
            config.lock_timeout_ms = Some(v);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_policy() {
        let cfg = HandshakeConfig::default();
        assert_eq!(cfg.build_ttl(), Duration::from_secs(900));
        assert_eq!(cfg.confirm_ttl(), Duration::from_secs(600));
        assert!(cfg.lock_timeout().is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn confirm_window_must_not_exceed_build() {
        let cfg = HandshakeConfig {
            confirm_ttl_secs: 1000,
            ..HandshakeConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TxGuardError::Configuration(_)));
    }

    #[test]
    fn zero_lock_timeout_rejected() {
        let cfg = HandshakeConfig {
            lock_timeout_ms: Some(0),
            ..HandshakeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = HandshakeConfig::from_lookup(lookup(&[
            (constants::ENV_BUILD_TTL_SECS, "120"),
            (constants::ENV_CONFIRM_TTL_SECS, "60"),
            (constants::ENV_LOCK_TIMEOUT_MS, " 2500 "),
        ]))
        .unwrap();
        assert_eq!(cfg.build_ttl_secs, 120);
        assert_eq!(cfg.confirm_ttl_secs, 60);
        assert_eq!(cfg.sweep_interval_secs, constants::DEFAULT_SWEEP_INTERVAL_SECS);
        assert_eq!(cfg.lock_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn env_rejects_non_numeric() {
        let err =
            HandshakeConfig::from_lookup(lookup(&[(constants::ENV_BUILD_TTL_SECS, "soon")]))
                .unwrap_err();
        assert!(format!("{err}").contains(constants::ENV_BUILD_TTL_SECS));
    }

    #[test]
    fn env_result_is_validated() {
        assert!(
            HandshakeConfig::from_lookup(lookup(&[(constants::ENV_CONFIRM_TTL_SECS, "5000")]))
                .is_err()
        );
    }

    #[test]
    fn serde_fills_missing_fields() {
        let cfg: HandshakeConfig = serde_json::from_str(r#"{"confirm_ttl_secs": 30}"#).unwrap();
        assert_eq!(cfg.confirm_ttl_secs, 30);
        assert_eq!(cfg.build_ttl_secs, constants::DEFAULT_BUILD_TTL_SECS);
    }
}
