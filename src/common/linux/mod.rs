use walkdir::{DirEntry, WalkDir};

use std::io::Error;
use std::path::{Path, PathBuf};

/// Where the kernel lists the PMUs perf_event can program.
pub const EVENT_SOURCE_DEVICES: &str = "/sys/bus/event_source/devices";

/// The CPUs that are currently online.
pub fn online_cpus() -> Result<Vec<usize>, Error> {
    let raw = std::fs::read_to_string("/sys/devices/system/cpu/online")?;

    parse_list(&raw)
}

/// Parses a kernel list such as `0-3,8,10-11`.
pub fn parse_list(raw: &str) -> Result<Vec<usize>, Error> {
    let raw = raw.trim();
    let mut ids = Vec::new();

    if raw.is_empty() {
        return Ok(ids);
    }

    for range in raw.split(',') {
        let mut parts = range.split('-');

        let first: Option<usize> = parts
            .next()
            .map(|text| text.trim().parse())
            .transpose()
            .map_err(|_| Error::other(format!("could not parse '{range}'")))?;
        let second: Option<usize> = parts
            .next()
            .map(|text| text.trim().parse())
            .transpose()
            .map_err(|_| Error::other(format!("could not parse '{range}'")))?;

        if parts.next().is_some() {
            // The line is invalid.
            return Err(Error::other(format!("could not parse '{range}'")));
        }

        match (first, second) {
            (Some(value), None) => ids.push(value),
            (Some(start), Some(stop)) => ids.extend(start..=stop),
            _ => continue,
        }
    }

    Ok(ids)
}

pub(crate) fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// A PMU registered with perf_event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pmu {
    pub name: String,
    /// The value for `perf_event_attr.type`
    pub type_: u32,
    /// CPUs the PMU should be opened on, from its `cpumask`
    pub cpus: Vec<usize>,
    pub path: PathBuf,
}

/// Lists the PMUs under `root` whose name starts with `prefix`, sorted by
/// name.
pub fn pmus(root: impl AsRef<Path>, prefix: &str) -> Result<Vec<Pmu>, Error> {
    let mut pmus = Vec::new();

    let walker = WalkDir::new(root.as_ref())
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .into_iter();

    for entry in walker.filter_entry(|e| !is_hidden(e)).filter_map(|e| e.ok()) {
        let name = match entry.file_name().to_str() {
            Some(name) if name.starts_with(prefix) => name.to_string(),
            _ => continue,
        };

        let path = entry.path().to_path_buf();

        let type_ = match std::fs::read_to_string(path.join("type"))
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            Some(type_) => type_,
            None => {
                debug!("skipping pmu '{name}' without a readable type");
                continue;
            }
        };

        let cpus = match std::fs::read_to_string(path.join("cpumask")) {
            Ok(raw) => parse_list(&raw)?,
            Err(_) => Vec::new(),
        };

        pmus.push(Pmu {
            name,
            type_,
            cpus,
            path,
        });
    }

    pmus.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(pmus)
}
