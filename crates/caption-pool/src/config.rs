use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;
pub const DEFAULT_LANGUAGE: &str = "french";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    /// quiet period after the latest request before a batch is flushed
    pub batch_delay_ms: u64,
    /// upper bound on how long the first request of a batch may wait,
    /// `None` keeps postponing while requests keep arriving
    pub max_wait_ms: Option<u64>,
    pub default_language: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            max_wait_ms: None,
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl BatchConfig {
    /// Read `CAPTION_BATCH_DELAY_MS`, `CAPTION_MAX_WAIT_MS` and
    /// `CAPTION_DEFAULT_LANGUAGE`, missing values use the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("CAPTION_BATCH_DELAY_MS") {
            config.batch_delay_ms = v
                .trim()
                .parse()
                .with_context(|| format!("invalid CAPTION_BATCH_DELAY_MS: {}", v))?;
        }

        if let Some(v) = lookup("CAPTION_MAX_WAIT_MS") {
            config.max_wait_ms = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("invalid CAPTION_MAX_WAIT_MS: {}", v))?,
            );
        }

        if let Some(v) = lookup("CAPTION_DEFAULT_LANGUAGE") {
            let v = v.trim();
            if !v.is_empty() {
                config.default_language = v.to_string();
            }
        }

        Ok(config)
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait_ms = max_wait.map(|v| v.as_millis() as u64);
        self
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}
