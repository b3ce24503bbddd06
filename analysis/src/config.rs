//! Tunables for the analysis coordinator.
//!
//! Every value has a compile-time default. [`CoordinatorConfig::from_env`]
//! lets each one be overridden through a dedicated environment variable; an
//! unparseable value falls back to the default.

use std::str::FromStr;
use std::time::Duration;

use engine::GoParams;
use serde::{Deserialize, Serialize};

/// Quiet period after the last position request before it is submitted.
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// How long to wait for `bestmove` after `stop` before giving up on it.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 500;

/// Budget for the whole `uci` .. `readyok` exchange of one attempt.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_INIT_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles per attempt up to the cap.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Shallowest rank-1 line allowed to replace the published evaluation.
pub const DEFAULT_MIN_PUBLISH_DEPTH: u32 = 8;

pub const DEFAULT_MULTI_PV: u8 = 3;
pub const MAX_MULTI_PV: u8 = 5;

/// How long each search runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchLimit {
    /// Until the next position or an explicit stop.
    Infinite,
    Depth(u32),
    MoveTime(u64),
}

impl SearchLimit {
    pub fn go_params(&self) -> GoParams {
        match *self {
            Self::Infinite => GoParams {
                infinite: true,
                ..Default::default()
            },
            Self::Depth(depth) => GoParams {
                depth: Some(depth),
                ..Default::default()
            },
            Self::MoveTime(ms) => GoParams {
                movetime: Some(ms),
                ..Default::default()
            },
        }
    }
}

/// Per-search settings, adjustable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub multi_pv: u8,
    pub search: SearchLimit,
}

impl AnalysisConfig {
    pub fn new(multi_pv: u8, search: SearchLimit) -> Self {
        Self { multi_pv, search }.clamped()
    }

    /// MultiPV is kept within `1..=MAX_MULTI_PV`.
    pub fn clamped(self) -> Self {
        Self {
            multi_pv: self.multi_pv.clamp(1, MAX_MULTI_PV),
            ..self
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            multi_pv: DEFAULT_MULTI_PV,
            search: SearchLimit::Infinite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
    pub stop_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Total initialization attempts before the engine is marked failed.
    pub max_init_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub min_publish_depth: u32,
    pub analysis: AnalysisConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            max_init_attempts: DEFAULT_INIT_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            min_publish_depth: DEFAULT_MIN_PUBLISH_DEPTH,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Defaults, overridden by:
    ///
    /// - `CHESSLENS_DEBOUNCE_MS`
    /// - `CHESSLENS_STOP_TIMEOUT_MS`
    /// - `CHESSLENS_HANDSHAKE_TIMEOUT_MS`
    /// - `CHESSLENS_INIT_ATTEMPTS`
    /// - `CHESSLENS_MIN_PUBLISH_DEPTH`
    /// - `CHESSLENS_MULTI_PV`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debounce: Duration::from_millis(env_or("CHESSLENS_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)),
            stop_timeout: Duration::from_millis(env_or(
                "CHESSLENS_STOP_TIMEOUT_MS",
                DEFAULT_STOP_TIMEOUT_MS,
            )),
            handshake_timeout: Duration::from_millis(env_or(
                "CHESSLENS_HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            )),
            max_init_attempts: env_or("CHESSLENS_INIT_ATTEMPTS", DEFAULT_INIT_ATTEMPTS).max(1),
            min_publish_depth: env_or("CHESSLENS_MIN_PUBLISH_DEPTH", DEFAULT_MIN_PUBLISH_DEPTH),
            analysis: AnalysisConfig::new(
                env_or("CHESSLENS_MULTI_PV", DEFAULT_MULTI_PV),
                defaults.analysis.search,
            ),
            ..defaults
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_pv_is_clamped() {
        assert_eq!(AnalysisConfig::new(0, SearchLimit::Infinite).multi_pv, 1);
        assert_eq!(AnalysisConfig::new(9, SearchLimit::Infinite).multi_pv, MAX_MULTI_PV);
        assert_eq!(AnalysisConfig::new(2, SearchLimit::Infinite).multi_pv, 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.backoff_after(1), Duration::from_millis(500));
        assert_eq!(config.backoff_after(2), Duration::from_millis(1_000));
        assert_eq!(config.backoff_after(3), Duration::from_millis(2_000));
        assert_eq!(config.backoff_after(10), Duration::from_millis(DEFAULT_MAX_BACKOFF_MS));
        assert_eq!(config.backoff_after(40), Duration::from_millis(DEFAULT_MAX_BACKOFF_MS));
    }

    #[test]
    fn test_search_limit_go_params() {
        assert_eq!(SearchLimit::Infinite.go_params().to_uci(), "go infinite");
        assert_eq!(SearchLimit::Depth(20).go_params().to_uci(), "go depth 20");
        assert_eq!(SearchLimit::MoveTime(750).go_params().to_uci(), "go movetime 750");
    }

    #[test]
    fn test_from_env_defaults() {
        let config = CoordinatorConfig::from_env();
        match std::env::var("CHESSLENS_DEBOUNCE_MS") {
            Ok(_) => {}
            Err(_) => assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS)),
        }
        assert!(config.max_init_attempts >= 1);
        assert!((1..=MAX_MULTI_PV).contains(&config.analysis.multi_pv));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CHESSLENS_TEST_GARBAGE_VALUE", "not-a-number");
        assert_eq!(env_or("CHESSLENS_TEST_GARBAGE_VALUE", 42u64), 42);
        std::env::set_var("CHESSLENS_TEST_GARBAGE_VALUE", " 7 ");
        assert_eq!(env_or("CHESSLENS_TEST_GARBAGE_VALUE", 42u64), 7);
        std::env::remove_var("CHESSLENS_TEST_GARBAGE_VALUE");
    }
}
