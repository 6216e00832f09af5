use super::*;
use crate::registry::*;

use linkme::distributed_slice;

fn format(s: &Snapshot, column: usize) -> String {
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
static BRANCH_MISPRED: BundleDef = BundleDef {
    name: "branch-mispred",
    description: "Branches and branch mispredictions per stage call",
    source: "hardware",
    footer: None,
    bundle_type: BundleType::Node,
    offset_type: OffsetType::Mmap,
    events: &[4, 5],
    metrics: &[],
    cpu_supports: &[],
    init: None,
    column_headers: &[
        "Calls",
        "Branches/Call",
        "Mispredicts/Call",
        "Mispredicts/Unit",
        "Mispredict Ratio",
    ],
    format,
};
