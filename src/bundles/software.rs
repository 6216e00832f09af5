use super::*;
use crate::registry::*;

use linkme::distributed_slice;

fn format_context_switches(s: &Snapshot, column: usize) -> String {
    match column {
        0 => float(per_second(s, 0)),
        1 => float(per_second(s, 1)),
        2 => count(s.value[0]),
        3 => count(s.value[1]),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static CONTEXT_SWITCHES: BundleDef = BundleDef {
    name: "context-switches",
    description: "Context switches and CPU migrations of each worker thread",
    source: "software",
    footer: None,
    bundle_type: BundleType::Thread,
    offset_type: OffsetType::Mmap,
    events: &[3, 4],
    metrics: &[],
    cpu_supports: &[],
    init: None,
    column_headers: &[
        "Switches/s",
        "Migrations/s",
        "Switches",
        "Migrations",
    ],
    format: format_context_switches,
};

fn format_page_faults(s: &Snapshot, column: usize) -> String {
    match column {
        0..=2 => float(per_second(s, column)),
        3 => count(s.value[0]),
        _ => String::new(),
    }
}

#[distributed_slice(BUNDLES)]
static PAGE_FAULTS: BundleDef = BundleDef {
    name: "page-faults",
    description: "Page faults taken by each worker thread",
    source: "software",
    footer: None,
    bundle_type: BundleType::Thread,
    offset_type: OffsetType::Mmap,
    events: &[2, 5, 6],
    metrics: &[],
    cpu_supports: &[],
    init: None,
    column_headers: &["Faults/s", "Minor/s", "Major/s", "Faults"],
    format: format_page_faults,
};
