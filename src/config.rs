use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables of one media session
///
/// Every field has a default, so a config file only names what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A video keyframe is forced every this many frames
    pub keyframe_interval: u32,
    /// Decoder queue depth above which delta frames are shed
    pub max_decode_queue: usize,
    /// Audio cursor drift that triggers a resync
    pub latency_ceiling_ms: u64,
    /// Lookahead applied when the audio cursor is resynced
    pub min_lookahead_ms: u64,
    /// Data packets held per kind while its config is on the way
    pub pending_limit: usize,
    /// Capacity of stage and in-memory transport channels
    pub channel_capacity: usize,
    /// Frames the presentation surface may hold
    pub presenter_depth: usize,
    pub health_log_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 30,
            max_decode_queue: 15,
            latency_ceiling_ms: 100,
            min_lookahead_ms: 20,
            pending_limit: 64,
            channel_capacity: 256,
            presenter_depth: 3,
            health_log_interval_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).context("invalid session config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyframe_interval == 0 {
            bail!("keyframe_interval must be at least 1");
        }
        if self.pending_limit == 0 {
            bail!("pending_limit must be at least 1");
        }
        if self.channel_capacity == 0 || self.presenter_depth == 0 {
            bail!("channel capacities must be at least 1");
        }
        if self.health_log_interval_secs == 0 {
            bail!("health_log_interval_secs must be at least 1");
        }
        if self.min_lookahead_ms > self.latency_ceiling_ms {
            bail!(
                "min_lookahead_ms ({}) exceeds latency_ceiling_ms ({})",
                self.min_lookahead_ms,
                self.latency_ceiling_ms
            );
        }
        Ok(())
    }

    pub fn latency_ceiling(&self) -> Duration {
        Duration::from_millis(self.latency_ceiling_ms)
    }

    pub fn min_lookahead(&self) -> Duration {
        Duration::from_millis(self.min_lookahead_ms)
    }

    pub fn health_log_interval(&self) -> Duration {
        Duration::from_secs(self.health_log_interval_secs)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
