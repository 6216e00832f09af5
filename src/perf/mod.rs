//! Programming of perf_event counter groups.
//!
//! A [`CounterBackend`] turns a bundle and one measurement target into a
//! [`ProgrammedGroup`] that owns every descriptor and mapping it created.
//! Dropping the group closes them. The control layer only talks to these
//! traits so activation and teardown can be exercised without a PMU.

use crate::error::PerfmonError;
use crate::registry::{Bundle, Instance, Source};
use crate::runtime::CounterReader;
use crate::stats::Reading;

mod mmap;
mod reader;

#[cfg(target_os = "linux")]
mod event;
#[cfg(target_os = "linux")]
mod group;

pub use mmap::{MmapPage, PageReading, PerfEventMmapPage, DEFAULT_READ_RETRIES};
pub use reader::{MetricsReader, MmapReader};

#[cfg(target_os = "linux")]
pub use group::PerfBackend;

/// Everything needed to program one counter group.
pub struct GroupRequest<'a> {
    pub bundle: &'a Bundle,
    pub source: &'a Source,
    pub target: &'a Instance,
    /// Forces `exclude_kernel` on every event of the group.
    pub exclude_kernel: bool,
    /// Bound on seqlock retries for user space reads.
    pub read_retries: usize,
}

impl GroupRequest<'_> {
    /// Whether the group will be read around every stage call.
    pub fn needs_user_reads(&self) -> bool {
        self.bundle.bundle_type() == crate::registry::BundleType::Node
    }
}

/// Opens counter groups.
pub trait CounterBackend: Send {
    /// Opens every event of the bundle on the target as one group. The group
    /// is created disabled. Nothing stays open if any event fails.
    fn open(&mut self, request: &GroupRequest<'_>) -> Result<Box<dyn ProgrammedGroup>, PerfmonError>;
}

/// An open counter group. Descriptors and mappings are released on drop.
pub trait ProgrammedGroup: Send + Sync {
    fn target(&self) -> &Instance;

    /// The number of open descriptors this group holds.
    fn descriptors(&self) -> usize;

    fn enable(&mut self) -> Result<(), PerfmonError>;

    fn disable(&mut self) -> Result<(), PerfmonError>;

    fn reset(&mut self) -> Result<(), PerfmonError>;

    /// Reads the group through the kernel. Values are cumulative since the
    /// group was enabled or last reset.
    fn read(&mut self) -> Result<Reading, PerfmonError>;

    /// A reader for the hot path, taking readings without a system call.
    /// Only groups opened for node-scoped bundles provide one.
    fn reader(&self) -> Result<Box<dyn CounterReader>, PerfmonError>;
}
