//! Helpers for reading the processor topology from sysfs.

pub mod linux;
