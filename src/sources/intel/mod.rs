pub mod core_pmu;
pub mod uncore;
