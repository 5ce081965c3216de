//! Driver configuration.

use serde::{Deserialize, Serialize};

/// Limits and switches for a [`crate::Driver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Maximum number of actions applied by one flush. Default: 10_000.
    pub max_action_rounds: usize,
    /// Maximum number of flushes `settle` performs. Default: 100.
    pub max_settle_flushes: usize,
    /// Whether to record a [`crate::TraceEntry`] log.
    pub trace_enabled: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            max_action_rounds: 10_000,
            max_settle_flushes: 100,
            trace_enabled: false,
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `ARBOR_MAX_ACTION_ROUNDS`,
    /// `ARBOR_MAX_SETTLE_FLUSHES` and `ARBOR_TRACE`. Unparseable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = DriverConfig::default();
        if let Some(rounds) = parse_var(&lookup, "ARBOR_MAX_ACTION_ROUNDS") {
            config.max_action_rounds = rounds;
        }
        if let Some(flushes) = parse_var(&lookup, "ARBOR_MAX_SETTLE_FLUSHES") {
            config.max_settle_flushes = flushes;
        }
        if let Some(raw) = lookup("ARBOR_TRACE") {
            config.trace_enabled = matches!(raw.trim(), "1" | "true" | "yes" | "on");
        }
        config
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<usize> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
