//! Raw events of Intel core PMUs.
//!
//! The topdown events only exist on processors with the `PERF_METRICS`
//! register. Slots must lead the group and at least one metric event must
//! follow it for the kernel to expose the register.

use crate::cpu::{is_intel, CpuFeatures};
use crate::registry::*;
use crate::sources::format_event_umask;

use linkme::distributed_slice;

const RAW: EventType = EventType::Fixed(PERF_TYPE_RAW);

pub const TOPDOWN_SLOTS: usize = 0;
pub const TOPDOWN_RETIRING: usize = 1;
pub const TOPDOWN_BAD_SPEC: usize = 2;
pub const TOPDOWN_FE_BOUND: usize = 3;
pub const TOPDOWN_BE_BOUND: usize = 4;
pub const TOPDOWN_HEAVY_OPS: usize = 5;
pub const TOPDOWN_BR_MISPREDICT: usize = 6;
pub const TOPDOWN_FETCH_LAT: usize = 7;
pub const TOPDOWN_MEM_BOUND: usize = 8;
pub const CPU_CLK_UNHALTED_THREAD_P: usize = 9;
pub const INST_RETIRED_ANY_P: usize = 10;
pub const MEM_LOAD_RETIRED_L1_HIT: usize = 11;
pub const MEM_LOAD_RETIRED_L2_HIT: usize = 12;
pub const MEM_LOAD_RETIRED_L3_HIT: usize = 13;
pub const MEM_LOAD_RETIRED_L1_MISS: usize = 14;
pub const MEM_LOAD_RETIRED_L2_MISS: usize = 15;
pub const MEM_LOAD_RETIRED_L3_MISS: usize = 16;

/// Lanes of the `PERF_METRICS` register.
pub const METRIC_RETIRING: usize = 0;
pub const METRIC_BAD_SPEC: usize = 1;
pub const METRIC_FE_BOUND: usize = 2;
pub const METRIC_BE_BOUND: usize = 3;
pub const METRIC_HEAVY_OPS: usize = 4;
pub const METRIC_BR_MISPREDICT: usize = 5;
pub const METRIC_FETCH_LAT: usize = 6;
pub const METRIC_MEM_BOUND: usize = 7;

static EVENTS: &[Event] = &[
    Event::new(RAW, 0x0400, "topdown.slots", "Issue slots available to the thread"),
    Event::new(RAW, 0x8000, "topdown.retiring", "Slots that retired uops"),
    Event::new(RAW, 0x8100, "topdown.bad-spec", "Slots wasted on bad speculation"),
    Event::new(RAW, 0x8200, "topdown.fe-bound", "Slots the frontend left empty"),
    Event::new(RAW, 0x8300, "topdown.be-bound", "Slots stalled on the backend"),
    Event::new(RAW, 0x8400, "topdown.heavy-ops", "Slots retiring microcoded or multi-uop instructions"),
    Event::new(RAW, 0x8500, "topdown.br-mispredict", "Slots wasted on mispredicted branches"),
    Event::new(RAW, 0x8600, "topdown.fetch-lat", "Slots lost to frontend fetch latency"),
    Event::new(RAW, 0x8700, "topdown.mem-bound", "Slots stalled on the memory subsystem"),
    Event::new(RAW, 0x003c, "cpu_clk_unhalted.thread_p", "Core cycles while not halted"),
    Event::new(RAW, 0x00c0, "inst_retired.any_p", "Instructions retired"),
    Event::new(RAW, 0x01d1, "mem_load_retired.l1_hit", "Retired loads that hit L1"),
    Event::new(RAW, 0x02d1, "mem_load_retired.l2_hit", "Retired loads that hit L2"),
    Event::new(RAW, 0x04d1, "mem_load_retired.l3_hit", "Retired loads that hit L3"),
    Event::new(RAW, 0x08d1, "mem_load_retired.l1_miss", "Retired loads that missed L1"),
    Event::new(RAW, 0x10d1, "mem_load_retired.l2_miss", "Retired loads that missed L2"),
    Event::new(RAW, 0x20d1, "mem_load_retired.l3_miss", "Retired loads that missed L3"),
];

fn init(_: &mut Source, features: &CpuFeatures) -> anyhow::Result<()> {
    if !is_intel(features) {
        anyhow::bail!("not an Intel processor");
    }

    Ok(())
}

#[distributed_slice(SOURCES)]
static INTEL_CORE: SourceDef = SourceDef::new(
    "intel-core",
    "Raw events of the Intel core PMU",
    EVENTS,
)
.init(init)
.format_config(format_event_umask);
