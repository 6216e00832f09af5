use perfmon::config::Config;
use perfmon::control::{BundleInfo, SourceInfo};
use perfmon::pipeline::{Graph, Pipeline, Stage};
use perfmon::{BundleType, CpuFeatures, Perfmon, Registry};

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, Command};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use std::collections::HashMap;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// Packets handled by each synthetic stage call.
const BATCH: u64 = 32;

fn main() {
    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "perfmon attributes hardware performance counters to the stages of a \
            run-to-completion packet processing pipeline.",
        )
        .arg(
            Arg::new("CONFIG")
                .long("config")
                .short('c')
                .help("Configuration file")
                .action(ArgAction::Set)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(Command::new("list-sources").about("List the counter sources and their events"))
        .subcommand(Command::new("list-bundles").about("List the bundles available on this processor"))
        .subcommand(
            Command::new("run")
                .about("Measure a bundle on the reference pipeline")
                .arg(
                    Arg::new("BUNDLE")
                        .long("bundle")
                        .short('b')
                        .help("Bundle to measure, overrides the configuration")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("DURATION")
                        .long("duration")
                        .short('d')
                        .help("How long to measure, for example 500ms or 10s")
                        .action(ArgAction::Set),
                ),
        )
        .get_matches();

    // load config from file
    let config = match matches.get_one::<String>("CONFIG") {
        Some(file) => match Config::load(file) {
            Ok(c) => c,
            Err(error) => {
                eprintln!("error loading config file: {file}\n{error}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log().level())
        .with_writer(std::io::stderr)
        .init();

    let registry = match Registry::builtin(CpuFeatures::detect()) {
        Ok(registry) => registry,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let result = match matches.subcommand() {
        Some(("list-sources", _)) => {
            list_sources(&registry);
            Ok(())
        }
        Some(("list-bundles", _)) => {
            list_bundles(&registry);
            Ok(())
        }
        Some(("run", args)) => run(
            registry,
            &config,
            args.get_one::<String>("BUNDLE").map(String::as_str),
            args.get_one::<String>("DURATION").map(String::as_str),
        ),
        _ => Err(anyhow!("no command given")),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn list_sources(registry: &Registry) {
    for source in registry.sources() {
        let info = SourceInfo::from(source.as_ref());

        println!("{}: {}", info.name, info.description);

        for (id, event) in info.events.iter().enumerate() {
            println!("  [{id:2}] {:<30} {:<32} {}", event.name, event.config, event.description);
        }

        for instance_type in &info.instance_types {
            println!("  {}: {}", instance_type.name, instance_type.instances.join(", "));
        }

        println!();
    }
}

fn list_bundles(registry: &Registry) {
    println!("{:<24} {:<8} {:<14} Description", "Name", "Type", "Source");

    for bundle in registry.bundles() {
        let info = BundleInfo::from(bundle.as_ref());

        println!(
            "{:<24} {:<8} {:<14} {}",
            info.name,
            info.bundle_type.to_string(),
            info.source,
            info.description
        );
    }
}

fn run(
    registry: Registry,
    config: &Config,
    bundle: Option<&str>,
    duration: Option<&str>,
) -> anyhow::Result<()> {
    let bundle = bundle.unwrap_or(config.pipeline().bundle()).to_string();

    let duration: Duration = match duration {
        Some(d) => d
            .parse::<humantime::Duration>()
            .with_context(|| format!("invalid duration '{d}'"))?
            .into(),
        None => config.pipeline().duration(),
    };

    let workers = config.pipeline().workers();
    let pin = config.pipeline().pin();

    let cpus = if pin {
        perfmon::common::linux::online_cpus().context("failed to list online CPUs")?
    } else {
        Vec::new()
    };

    let graph = Arc::new(Graph::new(workers, &cpus, synthetic_stages));
    let running = Arc::new(AtomicBool::new(true));
    let ready = Arc::new(Barrier::new(workers + 1));

    let mut threads = Vec::with_capacity(workers);

    for id in 0..workers {
        let worker = graph
            .worker(id)
            .ok_or_else(|| anyhow!("worker {id} is missing"))?;
        let running = running.clone();
        let ready = ready.clone();

        threads.push(
            std::thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    worker.bind_current_thread(pin);
                    ready.wait();
                    worker.run(&running)
                })?,
        );
    }

    ready.wait();

    debug!("{workers} workers running");

    let result = measure(registry, config, graph, &bundle, duration);

    running.store(false, Ordering::Relaxed);

    let mut units = 0;

    for thread in threads {
        units += thread
            .join()
            .map_err(|_| anyhow!("a worker thread panicked"))?;
    }

    info!("workers handled {units} packets");

    result
}

fn measure(
    registry: Registry,
    config: &Config,
    graph: Arc<Graph>,
    bundle: &str,
    duration: Duration,
) -> anyhow::Result<()> {
    let backend = backend()?;

    let mut perfmon = Perfmon::new(registry, backend, graph.clone(), config.options());

    perfmon.start(bundle)?;

    std::thread::sleep(duration);

    let active = perfmon
        .active_bundle()
        .cloned()
        .ok_or_else(|| anyhow!("bundle '{bundle}' is not running"))?;

    let headers = active.column_headers();

    let mut rows: Vec<(String, Vec<String>)> = Vec::new();

    if active.bundle_type() == BundleType::Node {
        for worker in 0..graph.workers().len() {
            for stage in 0..graph.stages(worker) {
                let snapshot = perfmon.read_statistics(stage, worker)?;
                let name = graph.stage_name(worker, stage).unwrap_or_default();

                rows.push((
                    format!("worker {worker} {name}"),
                    (0..headers.len())
                        .map(|c| active.format(&snapshot, c))
                        .collect(),
                ));
            }
        }
    } else {
        let instances: Vec<String> = perfmon.instances().iter().map(|i| i.to_string()).collect();

        for (index, instance) in instances.into_iter().enumerate() {
            let snapshot = perfmon.read_instance(index)?;

            rows.push((
                instance,
                (0..headers.len())
                    .map(|c| active.format(&snapshot, c))
                    .collect(),
            ));
        }
    }

    perfmon.stop()?;

    print!("{:<32}", "");
    for header in headers {
        print!(" {header:>18}");
    }
    println!();

    for (name, columns) in rows {
        print!("{name:<32}");
        for column in columns {
            print!(" {column:>18}");
        }
        println!();
    }

    if let Some(footer) = active.footer() {
        println!("\n{footer}");
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn backend() -> anyhow::Result<Box<dyn perfmon::perf::CounterBackend>> {
    Ok(Box::new(perfmon::perf::PerfBackend::new()?))
}

#[cfg(not(target_os = "linux"))]
fn backend() -> anyhow::Result<Box<dyn perfmon::perf::CounterBackend>> {
    Err(anyhow!("hardware counters are only supported on Linux"))
}

/// Three stages with different memory behavior: a streaming header parse, a
/// table lookup and a rewrite into a per-worker buffer.
fn synthetic_stages(_worker: usize) -> Vec<Stage> {
    let frames: Arc<Vec<u8>> = Arc::new((0..BATCH as usize * 64).map(|i| i as u8).collect());

    let table: Arc<HashMap<u32, u32>> =
        Arc::new((0..65_536u32).map(|k| (k.wrapping_mul(2_654_435_761), k)).collect());

    let output = Arc::new(Mutex::new(vec![0u8; BATCH as usize * 64]));

    let input = frames.clone();
    let lookup = frames.clone();
    let rewrite = frames;

    vec![
        Stage::new("ethernet-input", move || {
            let checksum = input
                .chunks(64)
                .map(|frame| frame[..14].iter().map(|b| *b as u32).sum::<u32>())
                .fold(0u32, u32::wrapping_add);
            black_box(checksum);
            BATCH
        }),
        Stage::new("ip4-lookup", move || {
            let mut hits = 0;
            for frame in lookup.chunks(64) {
                let key = u32::from_be_bytes([frame[26], frame[27], frame[28], frame[29]]);
                if table.get(&key.wrapping_mul(2_654_435_761)).is_some() {
                    hits += 1;
                }
            }
            black_box(hits);
            BATCH
        }),
        Stage::new("ip4-rewrite", move || {
            let mut output = output.lock();
            for (out, frame) in output.chunks_mut(64).zip(rewrite.chunks(64)) {
                out.copy_from_slice(frame);
                out[22] = out[22].wrapping_sub(1);
            }
            black_box(&*output);
            BATCH
        }),
    ]
}
