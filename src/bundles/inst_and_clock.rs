use super::*;
use crate::registry::*;

use linkme::distributed_slice;

const CYCLES: usize = 0;
const INSTRUCTIONS: usize = 1;

fn format(s: &Snapshot, column: usize) -> String {
    match column {
        0 => count(s.calls),
        1 => count(s.units),
        2 => float(s.per_call(CYCLES)),
        3 => float(s.per_unit(CYCLES)),
        4 => float(s.per_unit(INSTRUCTIONS)),
        5 => float(s.ratio(INSTRUCTIONS, CYCLES)),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static INST_AND_CLOCK: BundleDef = BundleDef {
    name: "inst-and-clock",
    description: "Instructions and clock cycles per stage call",
    source: "hardware",
    footer: None,
    bundle_type: BundleType::Node,
    offset_type: OffsetType::Mmap,
    events: &[0, 1],
    metrics: &[],
    cpu_supports: &[],
    init: None,
    column_headers: &[
        "Calls",
        "Units",
        "Clocks/Call",
        "Clocks/Unit",
        "Instructions/Unit",
        "IPC",
    ],
    format,
};
