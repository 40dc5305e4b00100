use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::core_modules::classifier::LatencyWindow;

pub const ENV_MODEL_DIR: &str = "LEAF_SCAN_MODEL_DIR";
pub const ENV_MIN_LATENCY_MS: &str = "LEAF_SCAN_MIN_LATENCY_MS";
pub const ENV_MAX_LATENCY_MS: &str = "LEAF_SCAN_MAX_LATENCY_MS";
pub const ENV_HISTORY_LIMIT: &str = "LEAF_SCAN_HISTORY_LIMIT";
pub const ENV_DISCARD_AFTER_STOP: &str = "LEAF_SCAN_DISCARD_AFTER_STOP";

/// Configuration for a `DetectionSession`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Directory holding the face detection model.
    pub model_dir: PathBuf,
    /// Simulated inference latency of the placeholder classifier.
    pub latency: LatencyWindow,
    /// Evict the oldest results beyond this many. `None` keeps everything.
    pub history_limit: Option<usize>,
    /// Drop a camera result whose stream was stopped while it was being classified.
    pub discard_after_stop: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            latency: LatencyWindow::default(),
            history_limit: None,
            discard_after_stop: false,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `LEAF_SCAN_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(dir) = lookup(ENV_MODEL_DIR).filter(|dir| !dir.is_empty()) {
            cfg.model_dir = PathBuf::from(dir);
        }

        let min = parse_var::<u64>(&lookup, ENV_MIN_LATENCY_MS).map(Duration::from_millis);
        let max = parse_var::<u64>(&lookup, ENV_MAX_LATENCY_MS).map(Duration::from_millis);
        if min.is_some() || max.is_some() {
            cfg.latency = LatencyWindow::new(min.unwrap_or(cfg.latency.min), max.unwrap_or(cfg.latency.max));
        }

        if let Some(limit) = parse_var::<usize>(&lookup, ENV_HISTORY_LIMIT) {
            cfg.history_limit = (limit > 0).then_some(limit);
        }

        if let Some(discard) = parse_var::<bool>(&lookup, ENV_DISCARD_AFTER_STOP) {
            cfg.discard_after_stop = discard;
        }

        cfg
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
