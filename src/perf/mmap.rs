//! User space reads of the perf_event counter page.
//!
//! The kernel publishes the state of a counter in the first page of its
//! mapping. Updates are bracketed by a sequence lock: `lock` is odd while the
//! page is being written. A reader samples `lock`, reads the fields and the
//! hardware counter, then checks that `lock` did not move.

use crate::metrics::READ_RETRIES_EXHAUSTED;
use crate::runtime::ReadError;

use std::ptr::{addr_of, read_volatile};
use std::sync::atomic::{compiler_fence, fence, Ordering};

/// Default bound on attempts to get a stable read of a page.
pub const DEFAULT_READ_RETRIES: usize = 64;

const CAP_USER_RDPMC: u64 = 1 << 2;
const CAP_USER_TIME: u64 = 1 << 3;
const CAP_USER_TIME_SHORT: u64 = 1 << 5;

/// The leading fields of `struct perf_event_mmap_page`.
#[repr(C)]
#[derive(Default)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub reserved_1: u32,
    pub time_cycles: u64,
    pub time_mask: u64,
}

/// One consistent sample of a counter page.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PageReading {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
}

/// The read-only mapping of one counter's page.
pub struct MmapPage {
    _map: memmap2::MmapRaw,
    page: *const PerfEventMmapPage,
    retries: usize,
}

// the mapping is read only and lives as long as the struct
unsafe impl Send for MmapPage {}
unsafe impl Sync for MmapPage {}

impl MmapPage {
    /// Maps the first page of a perf_event descriptor.
    pub fn new(fd: std::os::unix::io::RawFd, retries: usize) -> Result<Self, std::io::Error> {
        let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;

        let map = memmap2::MmapOptions::new()
            .len(pagesize)
            .map_raw_read_only(fd)?;

        let page = map.as_ptr() as *const PerfEventMmapPage;

        Ok(Self {
            _map: map,
            page,
            retries: retries.max(1),
        })
    }

    fn capabilities(&self) -> u64 {
        unsafe { read_volatile(addr_of!((*self.page).capabilities)) }
    }

    /// Whether counters can be read with `rdpmc` and the enabled and running
    /// times extended with the time stamp counter.
    pub fn user_reads_supported(&self) -> bool {
        cfg!(target_arch = "x86_64")
            && self.capabilities() & (CAP_USER_RDPMC | CAP_USER_TIME)
                == (CAP_USER_RDPMC | CAP_USER_TIME)
    }

    /// Reads the counter and the group times.
    #[inline]
    pub fn read(&self) -> Result<PageReading, ReadError> {
        unsafe { read_page(self.page, self.retries, None::<fn(u32, u16) -> u64>) }
    }

    /// Reads only the counter, for group members whose times are taken from
    /// the leader.
    #[inline]
    pub fn read_value(&self) -> Result<u64, ReadError> {
        unsafe { read_page_value(self.page, self.retries) }
    }

    /// Reads the group times while `read` samples other registers under the
    /// same sequence. `read` receives the page's `index` and `pmc_width`.
    #[inline]
    pub(crate) fn read_with<F: FnMut(u32, u16) -> u64>(
        &self,
        read: F,
    ) -> Result<PageReading, ReadError> {
        unsafe { read_page(self.page, self.retries, Some(read)) }
    }
}

/// Reads a counter page with the sequence lock protocol.
///
/// # Safety
///
/// `page` must point to a live, readable `perf_event_mmap_page`.
#[inline]
pub(crate) unsafe fn read_page<F: FnMut(u32, u16) -> u64>(
    page: *const PerfEventMmapPage,
    retries: usize,
    mut read: Option<F>,
) -> Result<PageReading, ReadError> {
    for _ in 0..retries {
        let seq = read_volatile(addr_of!((*page).lock));

        if seq & 1 == 1 {
            std::hint::spin_loop();
            continue;
        }

        fence(Ordering::Acquire);

        let index = read_volatile(addr_of!((*page).index));
        let capabilities = read_volatile(addr_of!((*page).capabilities));
        let mut time_enabled = read_volatile(addr_of!((*page).time_enabled));
        let mut time_running = read_volatile(addr_of!((*page).time_running));

        let value = match read.as_mut() {
            Some(read) => read(index, read_volatile(addr_of!((*page).pmc_width))),
            None => resident_value(page, index, capabilities),
        };

        if capabilities & CAP_USER_TIME != 0 {
            let time = TimeConversion {
                shift: read_volatile(addr_of!((*page).time_shift)),
                mult: read_volatile(addr_of!((*page).time_mult)),
                offset: read_volatile(addr_of!((*page).time_offset)),
                cycles: read_volatile(addr_of!((*page).time_cycles)),
                mask: read_volatile(addr_of!((*page).time_mask)),
                short: capabilities & CAP_USER_TIME_SHORT != 0,
            };

            let delta = time.delta(rdtsc());

            time_enabled = time_enabled.wrapping_add(delta);

            if index != 0 {
                time_running = time_running.wrapping_add(delta);
            }
        }

        compiler_fence(Ordering::SeqCst);
        fence(Ordering::Acquire);

        if read_volatile(addr_of!((*page).lock)) == seq {
            return Ok(PageReading {
                value,
                time_enabled,
                time_running,
            });
        }
    }

    exhausted(retries)
}

/// Reads the counter value of a page under the sequence lock, without the
/// times.
///
/// # Safety
///
/// `page` must point to a live, readable `perf_event_mmap_page`.
#[inline]
pub(crate) unsafe fn read_page_value(
    page: *const PerfEventMmapPage,
    retries: usize,
) -> Result<u64, ReadError> {
    for _ in 0..retries {
        let seq = read_volatile(addr_of!((*page).lock));

        if seq & 1 == 1 {
            std::hint::spin_loop();
            continue;
        }

        fence(Ordering::Acquire);

        let index = read_volatile(addr_of!((*page).index));
        let capabilities = read_volatile(addr_of!((*page).capabilities));
        let value = resident_value(page, index, capabilities);

        compiler_fence(Ordering::SeqCst);
        fence(Ordering::Acquire);

        if read_volatile(addr_of!((*page).lock)) == seq {
            return Ok(value);
        }
    }

    exhausted(retries)
}

/// The counter value from `offset` and, when the counter is resident on the
/// PMU, the hardware register. Index 0 means it is not resident.
#[inline(always)]
unsafe fn resident_value(page: *const PerfEventMmapPage, index: u32, capabilities: u64) -> u64 {
    let offset = read_volatile(addr_of!((*page).offset));

    if index != 0 && capabilities & CAP_USER_RDPMC != 0 {
        let width = read_volatile(addr_of!((*page).pmc_width));
        counter_value(offset, rdpmc(index - 1), width)
    } else {
        offset as u64
    }
}

#[cold]
fn exhausted<T>(retries: usize) -> Result<T, ReadError> {
    READ_RETRIES_EXHAUSTED.increment();
    trace!("counter page did not stabilize after {retries} attempts");

    Err(ReadError::Unstable(retries))
}

/// Extends the enabled and running times from the time stamp counter.
struct TimeConversion {
    shift: u16,
    mult: u32,
    offset: u64,
    cycles: u64,
    mask: u64,
    short: bool,
}

impl TimeConversion {
    fn delta(&self, mut cyc: u64) -> u64 {
        if self.short {
            cyc = self.cycles.wrapping_add(cyc.wrapping_sub(self.cycles) & self.mask);
        }

        let shift = self.shift as u32;
        let mult = self.mult as u64;
        let quot = cyc >> shift;
        let rem = cyc & ((1u64 << shift) - 1);

        self.offset
            .wrapping_add(quot.wrapping_mul(mult))
            .wrapping_add(rem.wrapping_mul(mult) >> shift)
    }
}

#[inline]
fn sign_extend(value: u64, width: u16) -> i64 {
    if width == 0 || width >= 64 {
        return value as i64;
    }

    let shift = 64 - width as u32;
    ((value << shift) as i64) >> shift
}

/// Combines the kernel's offset with the raw hardware counter.
#[inline]
pub(crate) fn counter_value(offset: i64, pmc: u64, width: u16) -> u64 {
    offset.wrapping_add(sign_extend(pmc, width)) as u64
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub(crate) fn rdpmc(counter: u32) -> u64 {
    let lo: u32;
    let hi: u32;

    unsafe {
        std::arch::asm!(
            "rdpmc",
            in("ecx") counter,
            lateout("eax") lo,
            lateout("edx") hi,
            options(nostack, nomem, preserves_flags)
        );
    }

    ((hi as u64) << 32) | lo as u64
}

// user reads are refused at setup on other architectures
#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub(crate) fn rdpmc(_counter: u32) -> u64 {
    0
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn rdtsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn rdtsc() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_read(_: u32, _: u16) -> u64 {
        unreachable!()
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xFFFF_FFFF_FFFF, 48), -1);
        assert_eq!(sign_extend(0x7FFF_FFFF_FFFF, 48), 0x7FFF_FFFF_FFFF);
        assert_eq!(counter_value(1_000, 0xFFFF_FFFF_FFFF, 48), 999);
        assert_eq!(counter_value(-100, 400, 48), 300);
        assert_eq!(counter_value(5, 7, 0), 12);
    }

    #[test]
    fn inactive_counter_reads_offset() {
        let page = PerfEventMmapPage {
            lock: 2,
            index: 0,
            offset: 12_345,
            time_enabled: 900,
            time_running: 400,
            ..Default::default()
        };

        let reading = unsafe { read_page(&page, 4, None::<fn(u32, u16) -> u64>) }.unwrap();

        assert_eq!(
            reading,
            PageReading {
                value: 12_345,
                time_enabled: 900,
                time_running: 400,
            }
        );
    }

    #[test]
    fn custom_read_sees_index_and_width() {
        let page = PerfEventMmapPage {
            index: 3,
            pmc_width: 48,
            time_enabled: 10,
            time_running: 10,
            ..Default::default()
        };

        let reading = unsafe { read_page(&page, 4, Some(|index, width| (index as u64) << width)) }
            .unwrap();

        assert_eq!(reading.value, 3 << 48);
        assert_eq!(reading.time_running, 10);
    }

    #[test]
    fn value_only_read() {
        let page = PerfEventMmapPage {
            lock: 4,
            index: 0,
            offset: 777,
            capabilities: CAP_USER_TIME,
            time_enabled: 10,
            ..Default::default()
        };

        assert_eq!(unsafe { read_page_value(&page, 4) }, Ok(777));

        let unstable = PerfEventMmapPage {
            lock: 1,
            ..Default::default()
        };

        assert_eq!(
            unsafe { read_page_value(&unstable, 3) },
            Err(ReadError::Unstable(3))
        );
    }

    #[test]
    fn odd_sequence_exhausts_retries() {
        let page = PerfEventMmapPage {
            lock: 7,
            ..Default::default()
        };

        let before = READ_RETRIES_EXHAUSTED.value();

        assert_eq!(
            unsafe { read_page(&page, 16, Some(no_read)) },
            Err(ReadError::Unstable(16))
        );
        assert!(READ_RETRIES_EXHAUSTED.value() > before);
    }

    #[test]
    fn time_extension() {
        // mult / 2^shift of 0.5ns per cycle
        let time = TimeConversion {
            shift: 10,
            mult: 512,
            offset: 100,
            cycles: 0,
            mask: 0,
            short: false,
        };

        assert_eq!(time.delta(0), 100);
        assert_eq!(time.delta(2_000), 1_100);
        assert_eq!(time.delta(2_001), 1_100);
    }
}
