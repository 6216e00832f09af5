use super::*;
use crate::cpu::is_intel;
use crate::registry::*;
use crate::sources::intel::core_pmu::*;

use linkme::distributed_slice;

fn format_cache_miss(s: &Snapshot, column: usize) -> String {
    match column {
        0 => count(s.calls),
        1 => float(s.per_call(0)),
        2 => float(s.per_call(1)),
        3 => float(s.per_unit(1)),
        4 => percent(s.ratio(1, 0)),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static CACHE_MISS: BundleDef = BundleDef {
    name: "cache-miss",
    description: "Last level cache references and misses per stage call",
    source: "hardware",
    footer: None,
    bundle_type: BundleType::Node,
    offset_type: OffsetType::Mmap,
    events: &[2, 3],
    metrics: &[],
    cpu_supports: &[],
    init: None,
    column_headers: &[
        "Calls",
        "References/Call",
        "Misses/Call",
        "Misses/Unit",
        "Miss Ratio",
    ],
    format: format_cache_miss,
};

fn format_hierarchy(s: &Snapshot, column: usize) -> String {
    match column {
        0 => count(s.calls),
        1 => count(s.units),
        2..=5 => float(s.per_unit(column - 2)),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static CACHE_HIERARCHY: BundleDef = BundleDef {
    name: "cache-hierarchy",
    description: "Where retired loads were served from, per unit of work",
    source: "intel-core",
    footer: Some("DRAM counts loads that missed L3, including those served by another socket"),
    bundle_type: BundleType::Unknown,
    offset_type: OffsetType::Mmap,
    events: &[
        MEM_LOAD_RETIRED_L1_HIT,
        MEM_LOAD_RETIRED_L2_HIT,
        MEM_LOAD_RETIRED_L3_HIT,
        MEM_LOAD_RETIRED_L3_MISS,
    ],
    metrics: &[],
    cpu_supports: &[CpuSupports::new(is_intel, BundleType::Node)],
    init: None,
    column_headers: &[
        "Calls",
        "Units",
        "L1 Hits/Unit",
        "L2 Hits/Unit",
        "L3 Hits/Unit",
        "DRAM/Unit",
    ],
    format: format_hierarchy,
};
