//! Built-in measurement bundles.
//!
//! Formatters receive the statistics of one stage (node bundles) or one
//! target (thread and system bundles) and render a single column.

use crate::stats::Snapshot;

mod branch;
mod cache;
mod inst_and_clock;
mod memory;
mod software;
mod topdown;

pub(crate) fn count(value: u64) -> String {
    value.to_string()
}

pub(crate) fn float(value: f64) -> String {
    format!("{value:.2}")
}

pub(crate) fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// `value[index]` per second the counters were enabled.
pub(crate) fn per_second(snapshot: &Snapshot, index: usize) -> f64 {
    if snapshot.time_enabled == 0 {
        0.0
    } else {
        snapshot.value[index] as f64 * 1e9 / snapshot.time_enabled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuFeatures, Vendor};
    use crate::registry::{BundleType, Registry, BUNDLES};
    use crate::PERF_MAX_EVENTS;

    #[test]
    fn every_column_renders() {
        let snapshot = Snapshot {
            calls: 10,
            units: 320,
            time_enabled: 2_000_000_000,
            time_running: 1_000_000_000,
            len: PERF_MAX_EVENTS,
            value: [1_000, 2_000, 3_000, 4_000, 5_000, 6_000, 7_000, 8_000],
        };

        for def in BUNDLES {
            assert!(!def.column_headers.is_empty(), "{}", def.name);

            for column in 0..def.column_headers.len() {
                assert!(!(def.format)(&snapshot, column).is_empty());
                assert!(!(def.format)(&Snapshot::default(), column).contains("NaN"));
            }

            assert!((def.format)(&snapshot, def.column_headers.len()).is_empty());
        }
    }

    #[test]
    fn topdown_needs_metrics() {
        let amd = Registry::builtin(CpuFeatures::new(Vendor::Amd, "zen4")).unwrap();
        assert!(amd.bundle("topdown-level1").is_none());
        assert_eq!(
            amd.bundle("inst-and-clock").unwrap().bundle_type(),
            BundleType::Node
        );

        let skylake = Registry::builtin(CpuFeatures::new(Vendor::Intel, "skylake")).unwrap();
        assert_eq!(
            skylake.bundle("topdown-level1").unwrap().bundle_type(),
            BundleType::Unknown
        );

        let icelake = Registry::builtin(CpuFeatures::new(Vendor::Intel, "icelake")).unwrap();
        assert_eq!(
            icelake.bundle("topdown-level1").unwrap().bundle_type(),
            BundleType::Node
        );
        assert_eq!(
            icelake.bundle("topdown-level2").unwrap().bundle_type(),
            BundleType::Unknown
        );

        let spr = Registry::builtin(CpuFeatures::new(Vendor::Intel, "sapphirerapids")).unwrap();
        assert_eq!(
            spr.bundle("topdown-level2").unwrap().bundle_type(),
            BundleType::Node
        );
    }

    #[test]
    fn helpers() {
        let snapshot = Snapshot {
            time_enabled: 500_000_000,
            value: [10, 0, 0, 0, 0, 0, 0, 0],
            ..Default::default()
        };

        assert_eq!(per_second(&snapshot, 0), 20.0);
        assert_eq!(per_second(&Snapshot::default(), 0), 0.0);
        assert_eq!(percent(0.25), "25.0%");
        assert_eq!(float(1.0 / 3.0), "0.33");
    }
}
