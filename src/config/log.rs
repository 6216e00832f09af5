use serde::Deserialize;
use tracing::Level;

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct Log {
    #[serde(default)]
    level: LogLevel,
}

impl Log {
    pub fn level(&self) -> Level {
        self.level.into()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
