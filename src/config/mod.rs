use crate::control::Options;

use serde::Deserialize;
use thiserror::Error;

use std::path::{Path, PathBuf};

mod general;
mod log;
mod pipeline;

pub use general::General;
pub use log::{Log, LogLevel};
pub use pipeline::PipelineConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to open config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{section}.{key} is not valid: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        reason: String,
    },
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    log: Log,
    #[serde(default)]
    pipeline: PipelineConfig,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        content.parse()
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.general.check()?;
        self.pipeline.check()
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// The activation options derived from `[general]`.
    pub fn options(&self) -> Options {
        Options {
            default_instance_type: self.general.default_instance_type().map(str::to_string),
            read_retries: self.general.read_retries(),
            exclude_kernel: self.general.exclude_kernel(),
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;

        config.check()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn defaults() {
        let config: Config = "".parse().unwrap();

        assert_eq!(config.general().read_retries(), 64);
        assert_eq!(config.general().default_instance_type(), None);
        assert!(!config.general().exclude_kernel());
        assert_eq!(config.log().level(), tracing::Level::INFO);
        assert_eq!(config.pipeline().workers(), 1);
        assert!(config.pipeline().pin());
        assert_eq!(config.pipeline().duration(), std::time::Duration::from_secs(5));
        assert_eq!(config.pipeline().bundle(), "inst-and-clock");
        assert_eq!(config.options(), Options::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();

        writeln!(
            file,
            r#"
[general]
default_instance_type = "imc"
read_retries = 16
exclude_kernel = true

[log]
level = "debug"

[pipeline]
workers = 4
pin = false
duration = "250ms"
bundle = "cache-miss"
"#
        )
        .unwrap();

        let config = Config::load(&file.path()).unwrap();

        assert_eq!(config.general().default_instance_type(), Some("imc"));
        assert_eq!(config.log().level(), tracing::Level::DEBUG);
        assert_eq!(config.pipeline().workers(), 4);
        assert_eq!(
            config.pipeline().duration(),
            std::time::Duration::from_millis(250)
        );

        let options = config.options();
        assert_eq!(options.read_retries, 16);
        assert!(options.exclude_kernel);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            "[general]\nread_retries = 0".parse::<Config>(),
            Err(ConfigError::Invalid {
                key: "read_retries",
                ..
            })
        ));
        assert!(matches!(
            "[pipeline]\nduration = \"soon\"".parse::<Config>(),
            Err(ConfigError::Invalid { key: "duration", .. })
        ));
        assert!(matches!(
            "[pipeline]\nworkers = 0".parse::<Config>(),
            Err(ConfigError::Invalid { key: "workers", .. })
        ));
        assert!(matches!(
            "[log]\nlevel = \"loud\"".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            "[sampler]\nenabled = true".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::load(&"/nonexistent/perfmon.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
