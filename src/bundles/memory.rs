use super::*;
use crate::registry::*;
use crate::sources::intel::uncore::{CAS_COUNT_RD, CAS_COUNT_WR};

use linkme::distributed_slice;

/// Bytes moved by one CAS command.
const CACHE_LINE: f64 = 64.0;

fn megabytes_per_second(s: &Snapshot, index: usize) -> f64 {
    per_second(s, index) * CACHE_LINE / 1e6
}

fn format(s: &Snapshot, column: usize) -> String {
    match column {
        0 => float(megabytes_per_second(s, 0)),
        1 => float(megabytes_per_second(s, 1)),
        2 => float(megabytes_per_second(s, 0) + megabytes_per_second(s, 1)),
        3 => percent(if s.time_enabled == 0 {
            0.0
        } else {
            s.time_running as f64 / s.time_enabled as f64
        }),
        _ => String::new(),
    }
}

fn init(bundle: &Bundle, source: &Source) -> anyhow::Result<()> {
    if source.instance_types().iter().all(|t| t.instances.is_empty()) {
        anyhow::bail!(
            "{} has no memory controllers to measure",
            bundle.source()
        );
    }

    Ok(())
}

#[distributed_slice(BUNDLES)]
static MEMORY_BANDWIDTH: BundleDef = BundleDef {
    name: "memory-bandwidth",
    description: "DRAM read and write bandwidth per memory controller",
    source: "intel-uncore",
    footer: None,
    bundle_type: BundleType::System,
    offset_type: OffsetType::Mmap,
    events: &[CAS_COUNT_RD, CAS_COUNT_WR],
    metrics: &[],
    cpu_supports: &[],
    init: Some(init),
    column_headers: &["Read MB/s", "Write MB/s", "Total MB/s", "Running"],
    format,
};
