use super::ConfigError;

use serde::Deserialize;

use std::time::Duration;

fn workers() -> usize {
    1
}

fn pin() -> bool {
    true
}

fn duration() -> String {
    "5s".into()
}

fn bundle() -> String {
    "inst-and-clock".into()
}

/// Settings of the reference pipeline run by `perfmon run`.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "workers")]
    workers: usize,
    #[serde(default = "pin")]
    pin: bool,
    #[serde(default = "duration")]
    duration: String,
    #[serde(default = "bundle")]
    bundle: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: workers(),
            pin: pin(),
            duration: duration(),
            bundle: bundle(),
        }
    }
}

impl PipelineConfig {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                section: "pipeline",
                key: "workers",
                reason: "at least one worker is required".into(),
            });
        }

        if let Err(e) = self.duration.parse::<humantime::Duration>() {
            return Err(ConfigError::Invalid {
                section: "pipeline",
                key: "duration",
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pin(&self) -> bool {
        self.pin
    }

    pub fn duration(&self) -> Duration {
        self.duration
            .parse::<humantime::Duration>()
            .map(Into::into)
            .unwrap_or(Duration::from_secs(5))
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }
}
