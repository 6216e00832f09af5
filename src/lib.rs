//! Hardware performance counter instrumentation for run-to-completion packet
//! processing pipelines.
//!
//! A [`Registry`] catalogs counter [`Source`]s and named measurement
//! [`Bundle`]s. Activating a bundle through [`Perfmon::start`] programs one
//! perf_event group per measurement target and, for node-scoped bundles,
//! installs a [`WorkerRuntime`] on every pipeline worker. The worker calls
//! [`WorkerRuntime::dispatch`] in place of a stage's function, which reads the
//! counters before and after the call and accumulates the deltas into
//! per-stage statistics.

#[macro_use]
extern crate tracing;

pub mod bundles;
pub mod common;
pub mod config;
pub mod control;
pub mod cpu;
pub mod error;
pub mod metrics;
pub mod perf;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod sources;
pub mod stats;

/// The maximum number of events (or metrics) a bundle may program into one
/// counter group.
pub const PERF_MAX_EVENTS: usize = 8;

pub use config::{Config, ConfigError};
pub use control::{BundleInfo, Options, Perfmon, SourceInfo, State};
pub use cpu::CpuFeatures;
pub use error::{PerfmonError, RegistryError};
pub use pipeline::{Pipeline, WorkerTarget};
pub use registry::{
    Bundle, BundleDef, BundleType, CpuSupports, Event, EventType, Instance, InstanceType,
    OffsetType, Registry, Source, SourceDef, BUNDLES, SOURCES,
};
pub use runtime::WorkerRuntime;
pub use stats::{Reading, Snapshot};
