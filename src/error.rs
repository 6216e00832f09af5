use crate::registry::BundleType;

use thiserror::Error;

/// Errors raised while building the source and bundle catalogs. These are
/// programming errors in the static definitions and abort startup.
#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("a source named '{0}' is already registered")]
    DuplicateSource(String),
    #[error("a bundle named '{0}' is already registered")]
    DuplicateBundle(String),
    #[error("bundle '{bundle}' references unknown source '{source_name}'")]
    UnknownSource { bundle: String, source_name: String },
    #[error("bundle '{bundle}' programs {count} events and metrics, at most {max} are allowed")]
    TooManyEvents {
        bundle: String,
        count: usize,
        max: usize,
    },
    #[error("bundle '{bundle}' references event {index} but source '{source_name}' has {len}")]
    EventOutOfRange {
        bundle: String,
        source_name: String,
        index: usize,
        len: usize,
    },
    #[error("bundle '{bundle}' references metric lane {index}, lanes are 0..{max}")]
    MetricOutOfRange {
        bundle: String,
        index: usize,
        max: usize,
    },
    #[error("bundle '{bundle}' takes event types from instances but can be {scope} scoped")]
    InstanceEventScope { bundle: String, scope: BundleType },
    #[error("source '{name}' failed to initialize: {reason}")]
    SourceInit { name: String, reason: String },
}

/// Errors reported to callers of the control operations.
#[derive(Error, Debug)]
pub enum PerfmonError {
    #[error("no bundle named '{0}'")]
    UnknownBundle(String),
    #[error("bundle '{0}' is already running")]
    AlreadyRunning(String),
    #[error("no bundle is running")]
    NotRunning,
    #[error("no bundle has been started")]
    NeverStarted,
    #[error("bundle '{0}' is not supported on this processor")]
    UnsupportedBundle(String),
    #[error("bundle '{bundle}' resolved to no {scope} targets")]
    NoTargets { bundle: String, scope: BundleType },
    #[error("bundle '{bundle}' failed to initialize: {reason}")]
    BundleInit { bundle: String, reason: String },
    #[error("failed to open event '{event}' on {target}: {source}")]
    Open {
        event: String,
        target: String,
        source: std::io::Error,
    },
    #[error("failed to map the counter page of '{event}' on {target}: {source}")]
    Mmap {
        event: String,
        target: String,
        source: std::io::Error,
    },
    #[error("failed to {op} the counter group on {target}: {source}")]
    Group {
        op: &'static str,
        target: String,
        source: std::io::Error,
    },
    #[error("bundle '{0}' is not node scoped")]
    NotNodeScoped(String),
    #[error("no worker {0}")]
    NoSuchWorker(usize),
    #[error("worker {0} has neither a thread id nor a cpu to measure")]
    UnboundWorker(usize),
    #[error("no stage {stage} on worker {worker}")]
    NoSuchStage { worker: usize, stage: usize },
    #[error("no measurement instance {0}")]
    NoSuchInstance(usize),
    #[error("{0}")]
    Unsupported(&'static str),
}
