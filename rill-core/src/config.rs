//! Runtime Configuration
//!
//! The engine is single-threaded, so configuration lives in thread-local
//! storage next to the propagation pass. Each thread starts with
//! [`RuntimeConfig::default`]; call [`RuntimeConfig::install`] to replace it.
//!
//! Configuration can be loaded from JSON:
//!
//! ```rust
//! use rill_core::config::{ClockSource, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "clock": "manual" }"#).unwrap();
//! assert_eq!(config.clock, ClockSource::Manual);
//! assert_eq!(config.integration_unit_ms, 1000.0);
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::{BehaviorError, Result};

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Where time sources read the current time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// Wall-clock milliseconds since the UNIX epoch.
    #[default]
    System,
    /// A thread-local clock moved explicitly with [`crate::clock::advance`].
    Manual,
}

/// Tunables for the propagation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on deliveries in a single propagation pass.
    ///
    /// A pass that exceeds it is almost certainly a feedback loop between
    /// sinks and is aborted with a panic.
    pub max_pass_deliveries: usize,

    /// Milliseconds per unit of integration. The default integrates per
    /// second.
    pub integration_unit_ms: f64,

    /// Clock used by `time`, `time_from` and `integrate`.
    pub clock: ClockSource,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_pass_deliveries: 1_000_000,
            integration_unit_ms: 1000.0,
            clock: ClockSource::System,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| BehaviorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_pass_deliveries == 0 {
            return Err(BehaviorError::Config(
                "max_pass_deliveries must be positive".to_string(),
            ));
        }
        if !(self.integration_unit_ms.is_finite() && self.integration_unit_ms > 0.0) {
            return Err(BehaviorError::Config(format!(
                "integration_unit_ms must be a positive number, got {}",
                self.integration_unit_ms
            )));
        }
        Ok(())
    }

    /// Install this configuration for the current thread.
    pub fn install(self) {
        tracing::debug!(config = ?self, "installing runtime configuration");
        CONFIG.with(|config| *config.borrow_mut() = self);
    }

    /// The configuration active on the current thread.
    pub fn current() -> Self {
        CONFIG.with(|config| config.borrow().clone())
    }
}
