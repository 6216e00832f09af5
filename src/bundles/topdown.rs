//! Topdown analysis from the `PERF_METRICS` register.
//!
//! Every lane is a share of the pipeline slots. The four level 1 lanes add
//! up to all slots, the level 2 lanes split one level 1 category each.

use super::*;
use crate::cpu::{has_topdown_level2, has_topdown_metrics};
use crate::registry::*;
use crate::sources::intel::core_pmu::*;

use linkme::distributed_slice;

const RETIRING: usize = 0;
const BAD_SPEC: usize = 1;
const FE_BOUND: usize = 2;
const BE_BOUND: usize = 3;

/// The share of all slots, from the level 1 lanes in values 0..4.
fn share(s: &Snapshot, value: u64) -> String {
    let slots: u64 = s.value[..4].iter().sum();

    if slots == 0 {
        percent(0.0)
    } else {
        percent(value as f64 / slots as f64)
    }
}

fn format_level1(s: &Snapshot, column: usize) -> String {
    match column {
        0 => count(s.calls),
        1..=4 => share(s, s.value[column - 1]),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static TOPDOWN_LEVEL1: BundleDef = BundleDef {
    name: "topdown-level1",
    description: "Top-down microarchitecture analysis, level 1",
    source: "intel-core",
    footer: Some("Shares of the pipeline slots spent by each stage"),
    bundle_type: BundleType::Unknown,
    offset_type: OffsetType::Metrics,
    events: &[TOPDOWN_SLOTS, TOPDOWN_RETIRING],
    metrics: &[METRIC_RETIRING, METRIC_BAD_SPEC, METRIC_FE_BOUND, METRIC_BE_BOUND],
    cpu_supports: &[CpuSupports::new(has_topdown_metrics, BundleType::Node)],
    init: None,
    column_headers: &[
        "Calls",
        "Retiring",
        "Bad Speculation",
        "Frontend Bound",
        "Backend Bound",
    ],
    format: format_level1,
};

fn format_level2(s: &Snapshot, column: usize) -> String {
    let fetch_latency = s.value[4];
    let memory_bound = s.value[5];

    match column {
        0 => count(s.calls),
        1 => share(s, fetch_latency),
        2 => share(s, s.value[FE_BOUND].saturating_sub(fetch_latency)),
        3 => share(s, memory_bound),
        4 => share(s, s.value[BE_BOUND].saturating_sub(memory_bound)),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static TOPDOWN_LEVEL2: BundleDef = BundleDef {
    name: "topdown-level2",
    description: "Top-down microarchitecture analysis, frontend and backend at level 2",
    source: "intel-core",
    footer: Some("Shares of the pipeline slots spent by each stage"),
    bundle_type: BundleType::Unknown,
    offset_type: OffsetType::Metrics,
    events: &[TOPDOWN_SLOTS, TOPDOWN_RETIRING],
    metrics: &[
        METRIC_RETIRING,
        METRIC_BAD_SPEC,
        METRIC_FE_BOUND,
        METRIC_BE_BOUND,
        METRIC_FETCH_LAT,
        METRIC_MEM_BOUND,
    ],
    cpu_supports: &[CpuSupports::new(has_topdown_level2, BundleType::Node)],
    init: None,
    column_headers: &[
        "Calls",
        "Fetch Latency",
        "Fetch Bandwidth",
        "Memory Bound",
        "Core Bound",
    ],
    format: format_level2,
};

fn format_level2_retire(s: &Snapshot, column: usize) -> String {
    let heavy_ops = s.value[4];
    let branch_mispredict = s.value[5];

    match column {
        0 => count(s.calls),
        1 => share(s, s.value[RETIRING].saturating_sub(heavy_ops)),
        2 => share(s, heavy_ops),
        3 => share(s, branch_mispredict),
        4 => share(s, s.value[BAD_SPEC].saturating_sub(branch_mispredict)),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static TOPDOWN_LEVEL2_RETIRE: BundleDef = BundleDef {
    name: "topdown-level2-retire",
    description: "Top-down microarchitecture analysis, retiring and bad speculation at level 2",
    source: "intel-core",
    footer: Some("Shares of the pipeline slots spent by each stage"),
    bundle_type: BundleType::Unknown,
    offset_type: OffsetType::Metrics,
    events: &[TOPDOWN_SLOTS, TOPDOWN_RETIRING],
    metrics: &[
        METRIC_RETIRING,
        METRIC_BAD_SPEC,
        METRIC_FE_BOUND,
        METRIC_BE_BOUND,
        METRIC_HEAVY_OPS,
        METRIC_BR_MISPREDICT,
    ],
    cpu_supports: &[CpuSupports::new(has_topdown_level2, BundleType::Node)],
    init: None,
    column_headers: &[
        "Calls",
        "Light Operations",
        "Heavy Operations",
        "Branch Mispredict",
        "Machine Clears",
    ],
    format: format_level2_retire,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares() {
        let s = Snapshot {
            calls: 4,
            len: 6,
            // retiring, bad spec, fe bound, be bound, then level 2 lanes
            value: [400, 100, 200, 300, 150, 250, 0, 0],
            ..Default::default()
        };

        assert_eq!(format_level1(&s, 1), "40.0%");
        assert_eq!(format_level1(&s, 4), "30.0%");

        assert_eq!(format_level2(&s, 1), "15.0%");
        assert_eq!(format_level2(&s, 2), "5.0%");
        assert_eq!(format_level2(&s, 3), "25.0%");
        assert_eq!(format_level2(&s, 4), "5.0%");

        assert_eq!(format_level2_retire(&s, 1), "25.0%");
        assert_eq!(format_level2_retire(&s, 4), "0.0%");
    }
}
