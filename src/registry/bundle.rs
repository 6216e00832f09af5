use crate::cpu::CpuFeatures;
use crate::registry::Source;
use crate::stats::Snapshot;

use serde::Serialize;

/// The granularity at which a bundle measures.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    /// Not measurable on this processor.
    #[default]
    Unknown,
    /// Counters are read around every stage invocation.
    Node,
    /// One counter group per worker thread.
    Thread,
    /// Counters cover the whole machine.
    System,
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Node => "node",
            Self::Thread => "thread",
            Self::System => "system",
        };

        f.write_str(name)
    }
}

/// How the counter values of a bundle are delivered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetType {
    /// One mapped counter per programmed event.
    #[default]
    Mmap,
    /// Lanes of the aggregate topdown metrics register.
    Metrics,
}

/// Overrides the bundle type when the predicate holds for the running CPU.
#[derive(Copy, Clone)]
pub struct CpuSupports {
    pub supported: fn(&CpuFeatures) -> bool,
    pub bundle_type: BundleType,
}

impl CpuSupports {
    pub const fn new(supported: fn(&CpuFeatures) -> bool, bundle_type: BundleType) -> Self {
        Self {
            supported,
            bundle_type,
        }
    }
}

pub type BundleInitFn = fn(&Bundle, &Source) -> anyhow::Result<()>;

/// Renders one column of a bundle's table for a statistics snapshot.
pub type FormatFn = fn(&Snapshot, usize) -> String;

/// Static definition of a bundle, collected into [`BUNDLES`].
///
/// [`BUNDLES`]: crate::registry::BUNDLES
#[derive(Copy, Clone)]
pub struct BundleDef {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
    pub footer: Option<&'static str>,
    pub bundle_type: BundleType,
    pub offset_type: OffsetType,
    /// Indices into the source's events. The first one leads the group.
    pub events: &'static [usize],
    /// Lanes of the metrics register, only for [`OffsetType::Metrics`].
    pub metrics: &'static [usize],
    pub cpu_supports: &'static [CpuSupports],
    pub init: Option<BundleInitFn>,
    pub column_headers: &'static [&'static str],
    pub format: FormatFn,
}

/// A registered bundle with its applicability resolved for this processor.
pub struct Bundle {
    def: BundleDef,
    bundle_type: BundleType,
}

impl Bundle {
    pub(crate) fn new(def: BundleDef, bundle_type: BundleType) -> Self {
        Self { def, bundle_type }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn description(&self) -> &'static str {
        self.def.description
    }

    pub fn source(&self) -> &'static str {
        self.def.source
    }

    pub fn footer(&self) -> Option<&'static str> {
        self.def.footer
    }

    /// The resolved bundle type.
    pub fn bundle_type(&self) -> BundleType {
        self.bundle_type
    }

    /// The bundle type declared before any CPU override.
    pub fn default_type(&self) -> BundleType {
        self.def.bundle_type
    }

    pub fn offset_type(&self) -> OffsetType {
        self.def.offset_type
    }

    pub fn events(&self) -> &'static [usize] {
        self.def.events
    }

    pub fn metrics(&self) -> &'static [usize] {
        self.def.metrics
    }

    pub fn cpu_supports(&self) -> &'static [CpuSupports] {
        self.def.cpu_supports
    }

    pub fn column_headers(&self) -> &'static [&'static str] {
        self.def.column_headers
    }

    /// The number of values each measurement produces.
    pub fn n_values(&self) -> usize {
        match self.def.offset_type {
            OffsetType::Mmap => self.def.events.len(),
            OffsetType::Metrics => self.def.metrics.len(),
        }
    }

    pub fn init(&self, source: &Source) -> anyhow::Result<()> {
        match self.def.init {
            Some(init) => init(self, source),
            None => Ok(()),
        }
    }

    pub fn format(&self, snapshot: &Snapshot, column: usize) -> String {
        (self.def.format)(snapshot, column)
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.def.name)
            .field("source", &self.def.source)
            .field("bundle_type", &self.bundle_type)
            .field("offset_type", &self.def.offset_type)
            .field("events", &self.def.events)
            .field("metrics", &self.def.metrics)
            .finish()
    }
}
