//! Evaluator configuration.
//!
//! Values come from three places, later ones winning:
//! 1. built-in defaults
//! 2. a host config document (`EvalConfig` is `Deserialize`)
//! 3. environment variables `STATECHECK_MAX_CONCURRENCY`,
//!    `STATECHECK_MAX_STEPS`, `STATECHECK_TASK_TIMEOUT_SECS`

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EvalConfig {
    /// Upper bound on concurrently evaluated Map iterations or Parallel
    /// branches within one container. Zero means unbounded.
    pub max_concurrency: usize,
    /// Maximum number of states one graph walk may visit.
    pub max_steps: usize,
    /// Task timeout used when a Task state declares no `TimeoutSeconds`.
    pub task_timeout_secs: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_concurrency: 16,
            max_steps: 1000,
            task_timeout_secs: 60,
        }
    }
}

impl EvalConfig {
    /// Defaults overridden by any `STATECHECK_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparseable config override");
                    None
                }
            }
        }

        let key = "STATECHECK_MAX_CONCURRENCY";
        if let Some(v) = parse(key, get(key)) {
            self.max_concurrency = v;
        }
        let key = "STATECHECK_MAX_STEPS";
        if let Some(v) = parse(key, get(key)) {
            self.max_steps = v;
        }
        let key = "STATECHECK_TASK_TIMEOUT_SECS";
        if let Some(v) = parse(key, get(key)) {
            self.task_timeout_secs = v;
        }
        self
    }

    /// Timeout for one task invocation; the state's own setting wins.
    pub fn task_timeout(&self, declared_secs: Option<u64>) -> Duration {
        Duration::from_secs(declared_secs.unwrap_or(self.task_timeout_secs))
    }

    /// Effective concurrency for a container: the smaller non-zero bound of
    /// the state's own limit and the configured cap, at least one.
    pub fn concurrency_for(&self, declared: usize, units: usize) -> usize {
        let bound = match (declared, self.max_concurrency) {
            (0, 0) => units,
            (0, cap) | (cap, 0) => cap,
            (a, b) => a.min(b),
        };
        bound.clamp(1, units.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = EvalConfig::default();
        assert_eq!(c.max_concurrency, 16);
        assert_eq!(c.max_steps, 1000);
        assert_eq!(c.task_timeout(None), Duration::from_secs(60));
        assert_eq!(c.task_timeout(Some(5)), Duration::from_secs(5));
    }

    #[test]
    fn deserializes_partial_document() {
        let c: EvalConfig = serde_json::from_value(serde_json::json!({"max_steps": 10})).unwrap();
        assert_eq!(c.max_steps, 10);
        assert_eq!(c.max_concurrency, 16);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("STATECHECK_MAX_CONCURRENCY", "4"),
            ("STATECHECK_MAX_STEPS", "lots"),
        ]
        .into_iter()
        .collect();
        let c = EvalConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.max_concurrency, 4);
        assert_eq!(c.max_steps, 1000);
    }

    #[test]
    fn concurrency_bounds() {
        let c = EvalConfig::default();
        assert_eq!(c.concurrency_for(0, 100), 16);
        assert_eq!(c.concurrency_for(2, 100), 2);
        assert_eq!(c.concurrency_for(0, 3), 3);
        assert_eq!(c.concurrency_for(0, 0), 1);
        let unbounded = EvalConfig {
            max_concurrency: 0,
            ..EvalConfig::default()
        };
        assert_eq!(unbounded.concurrency_for(0, 40), 40);
    }
}
