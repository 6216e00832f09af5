use super::mmap::{rdpmc, MmapPage, PageReading};
use crate::runtime::{CounterReader, ReadError};
use crate::stats::Reading;
use crate::PERF_MAX_EVENTS;

use std::sync::Arc;

/// `rdpmc` selector of the fixed counter counting topdown slots.
const RDPMC_FIXED_SLOTS: u32 = (1 << 30) | 3;

/// `rdpmc` selector of the `PERF_METRICS` register.
const RDPMC_PERF_METRICS: u32 = 1 << 29;

/// Reads one mapped counter per event. The group times come from the
/// leader's page, followers only contribute their counter.
pub struct MmapReader {
    pages: Vec<Arc<MmapPage>>,
}

impl MmapReader {
    pub fn new(pages: Vec<Arc<MmapPage>>) -> Self {
        debug_assert!(pages.len() <= PERF_MAX_EVENTS);

        Self { pages }
    }
}

impl CounterReader for MmapReader {
    #[inline]
    fn read(&self, reading: &mut Reading) -> Result<(), ReadError> {
        let mut pages = self.pages.iter();

        let leader = pages.next().ok_or(ReadError::NoCounters)?.read()?;

        reading.nr = self.pages.len();
        reading.time_enabled = leader.time_enabled;
        reading.time_running = leader.time_running;
        reading.value[0] = leader.value;

        for (value, page) in reading.value[1..].iter_mut().zip(pages) {
            *value = page.read_value()?;
        }

        Ok(())
    }
}

/// Reads lanes of the topdown metrics register.
///
/// Each lane holds the fraction, in 1/255ths, of pipeline slots spent in one
/// category since the slots counter was last reset. A lane's value is the
/// slots count scaled by that fraction.
pub struct MetricsReader {
    leader: Arc<MmapPage>,
    lanes: Vec<usize>,
}

impl MetricsReader {
    pub fn new(leader: Arc<MmapPage>, lanes: &[usize]) -> Self {
        debug_assert!(lanes.len() <= PERF_MAX_EVENTS);

        Self {
            leader,
            lanes: lanes.to_vec(),
        }
    }
}

impl CounterReader for MetricsReader {
    #[inline]
    fn read(&self, reading: &mut Reading) -> Result<(), ReadError> {
        let mut metrics = 0;

        let PageReading {
            value: slots,
            time_enabled,
            time_running,
        } = self.leader.read_with(|_, _| {
            metrics = rdpmc(RDPMC_PERF_METRICS);
            rdpmc(RDPMC_FIXED_SLOTS)
        })?;

        reading.nr = self.lanes.len();
        reading.time_enabled = time_enabled;
        reading.time_running = time_running;
        fill_lanes(&mut reading.value, slots, metrics, &self.lanes);

        Ok(())
    }
}

#[inline]
fn fill_lanes(values: &mut [u64; PERF_MAX_EVENTS], slots: u64, metrics: u64, lanes: &[usize]) {
    for (value, &lane) in values.iter_mut().zip(lanes) {
        let fraction = (metrics >> (8 * lane)) & 0xff;
        *value = (slots as u128 * fraction as u128 / 0xff) as u64;
    }
}
