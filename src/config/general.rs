use super::ConfigError;
use crate::perf::DEFAULT_READ_RETRIES;

use serde::Deserialize;

fn read_retries() -> usize {
    DEFAULT_READ_RETRIES
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct General {
    #[serde(default)]
    default_instance_type: Option<String>,
    #[serde(default = "read_retries")]
    read_retries: usize,
    #[serde(default)]
    exclude_kernel: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            default_instance_type: None,
            read_retries: read_retries(),
            exclude_kernel: false,
        }
    }
}

impl General {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.read_retries == 0 {
            return Err(ConfigError::Invalid {
                section: "general",
                key: "read_retries",
                reason: "at least one attempt is required".into(),
            });
        }

        Ok(())
    }

    pub fn default_instance_type(&self) -> Option<&str> {
        self.default_instance_type.as_deref()
    }

    pub fn read_retries(&self) -> usize {
        self.read_retries
    }

    pub fn exclude_kernel(&self) -> bool {
        self.exclude_kernel
    }
}
