//! Memory controller events of the Intel uncore.
//!
//! Each `uncore_imc_*` PMU gets its own perf type, so events take their type
//! from the instance being measured.

use crate::common::linux::{pmus, EVENT_SOURCE_DEVICES};
use crate::cpu::{has_uncore_imc, CpuFeatures};
use crate::registry::*;
use crate::sources::format_event_umask;

use linkme::distributed_slice;

use std::path::Path;

pub const IMC: usize = 0;

pub const CAS_COUNT_RD: usize = 0;
pub const CAS_COUNT_WR: usize = 1;

const FROM_IMC: EventType = EventType::FromInstance(IMC);

static EVENTS: &[Event] = &[
    Event::new(FROM_IMC, 0x0304, "unc_m_cas_count.rd", "DRAM read CAS commands, 64 bytes each"),
    Event::new(FROM_IMC, 0x0c04, "unc_m_cas_count.wr", "DRAM write CAS commands, 64 bytes each"),
];

/// One instance per memory controller and socket, from the PMU's cpumask.
pub(crate) fn discover(source: &mut Source, root: &Path) -> anyhow::Result<()> {
    let mut imc = InstanceType::new("imc");

    // skip the free running counters, they take other events
    let controllers = pmus(root, "uncore_imc_")?.into_iter().filter(|pmu| {
        pmu.name["uncore_imc_".len()..]
            .chars()
            .all(|c| c.is_ascii_digit())
    });

    for pmu in controllers {
        for &cpu in &pmu.cpus {
            imc.instances.push(
                Instance::new(format!("{}/cpu{cpu}", pmu.name))
                    .with_type(pmu.type_)
                    .with_cpu(cpu),
            );
        }
    }

    if imc.instances.is_empty() {
        anyhow::bail!("no memory controller PMUs under {}", root.display());
    }

    debug!("found {} memory controller instances", imc.instances.len());

    source.add_instance_type(imc);

    Ok(())
}

fn init(source: &mut Source, features: &CpuFeatures) -> anyhow::Result<()> {
    if !has_uncore_imc(features) {
        anyhow::bail!("no supported memory controller PMU on {}", features.uarch());
    }

    discover(source, Path::new(EVENT_SOURCE_DEVICES))
}

#[distributed_slice(SOURCES)]
static INTEL_UNCORE: SourceDef = SourceDef::new(
    "intel-uncore",
    "Memory controller events of the Intel uncore",
    EVENTS,
)
.init(init)
.format_config(format_event_umask);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery() {
        let root = tempfile::tempdir().unwrap();

        for (name, type_) in [
            ("uncore_imc_0", 13),
            ("uncore_imc_1", 14),
            ("uncore_imc_free_running_0", 20),
        ] {
            let dir = root.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("type"), type_.to_string()).unwrap();
            std::fs::write(dir.join("cpumask"), "0,28\n").unwrap();
        }

        let mut source = Source::from_def(&INTEL_UNCORE);
        discover(&mut source, root.path()).unwrap();

        let imc = source.instance_type(IMC).unwrap();
        assert_eq!(imc.name, "imc");
        assert_eq!(imc.instances.len(), 4);
        assert_eq!(imc.instances[1].name, "uncore_imc_0/cpu28");
        assert_eq!(imc.instances[2].type_, 14);
        assert_eq!(imc.instances[3].cpu, Some(28));

        let event = source.event(CAS_COUNT_WR).unwrap();
        assert_eq!(event.perf_type(&imc.instances[2]), 14);
        assert_eq!(source.format_config(event.config), "event=0x04 umask=0x0c");
    }

    #[test]
    fn nothing_to_discover() {
        let root = tempfile::tempdir().unwrap();
        let mut source = Source::from_def(&INTEL_UNCORE);

        assert!(discover(&mut source, root.path()).is_err());
        assert!(source.instance_types().is_empty());
    }
}
