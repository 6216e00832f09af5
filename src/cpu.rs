//! Processor identification used to gate bundles on the running CPU.
//!
//! Features are detected once at startup and never change while the process
//! runs, which is why bundle applicability is computed at registration time.

use archspec::cpu::Microarchitecture;

use std::collections::HashSet;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Vendor {
    Intel,
    Amd,
    Arm,
    #[default]
    Unknown,
}

impl Vendor {
    fn from_vendor_id(id: &str) -> Self {
        match id {
            "GenuineIntel" => Self::Intel,
            "AuthenticAMD" => Self::Amd,
            "ARM" => Self::Arm,
            _ => Self::Unknown,
        }
    }
}

/// The features of the processor the bundles are evaluated against.
#[derive(Clone, Debug, Default)]
pub struct CpuFeatures {
    vendor: Vendor,
    uarch: String,
    flags: HashSet<String>,
}

impl CpuFeatures {
    pub fn new(vendor: Vendor, uarch: impl Into<String>) -> Self {
        Self {
            vendor,
            uarch: uarch.into(),
            flags: HashSet::new(),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// Detect the features of the host processor.
    pub fn detect() -> Self {
        let mut features = match archspec::cpu::host() {
            Ok(uarch) => Self::from_microarchitecture(&uarch),
            Err(e) => {
                debug!("unable to identify the host microarchitecture: {e:?}");
                Self::default()
            }
        };

        if features.vendor == Vendor::Unknown && cfg!(target_arch = "aarch64") {
            features.vendor = Vendor::Arm;
        }

        debug!(
            "detected cpu: vendor: {:?} uarch: {} flags: {}",
            features.vendor,
            features.uarch,
            features.flags.len()
        );

        features
    }

    fn from_microarchitecture(uarch: &Microarchitecture) -> Self {
        Self {
            vendor: Vendor::from_vendor_id(uarch.vendor()),
            uarch: uarch.name().to_owned(),
            flags: uarch.all_features(),
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn uarch(&self) -> &str {
        &self.uarch
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}

pub fn is_intel(features: &CpuFeatures) -> bool {
    features.vendor == Vendor::Intel
}

pub fn is_amd(features: &CpuFeatures) -> bool {
    features.vendor == Vendor::Amd
}

/// Intel cores with the PERF_METRICS register (Ice Lake and later).
pub fn has_topdown_metrics(features: &CpuFeatures) -> bool {
    is_intel(features)
        && matches!(
            features.uarch(),
            "icelake"
                | "tigerlake"
                | "alderlake"
                | "raptorlake"
                | "meteorlake"
                | "sapphirerapids"
                | "emeraldrapids"
                | "graniterapids"
        )
}

/// Intel cores exposing the second level topdown lanes.
pub fn has_topdown_level2(features: &CpuFeatures) -> bool {
    is_intel(features)
        && matches!(
            features.uarch(),
            "sapphirerapids" | "emeraldrapids" | "graniterapids"
        )
}

/// Intel server parts with integrated memory controller uncore PMUs.
pub fn has_uncore_imc(features: &CpuFeatures) -> bool {
    is_intel(features)
        && matches!(
            features.uarch(),
            "skylake_avx512"
                | "cascadelake"
                | "cooperlake"
                | "icelake"
                | "sapphirerapids"
                | "emeraldrapids"
        )
}
