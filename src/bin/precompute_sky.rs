//! Run a precomputation and print a summary of the resulting tables.

use std::path::PathBuf;
use std::process;

use precomputed_sky::{Atmosphere, PrecomputeConfig, PrecomputeError, TableRef};

fn usage() {
    eprintln!("Usage: precompute-sky [OPTIONS]");
    eprintln!("  --config <path>      RON configuration (default: Earth)");
    eprintln!("  --threads <n>        Worker threads (default: automatic)");
    eprintln!("  --max-order <n>      Highest scattering order (overrides the configuration)");
}

/// Parse the value following a flag, exiting with a message if it's missing
/// or malformed.
fn value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i).map(|arg| arg.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("invalid or missing {flag} value");
            process::exit(1);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PrecomputeConfig, String> {
    let Some(path) = path else {
        return Ok(PrecomputeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    PrecomputeConfig::from_ron(&text).map_err(|e| format!("{}: {e}", path.display()))
}

/// (min, max) over the first `channels` channels of every texel.
fn range<'a>(texels: impl Iterator<Item = &'a [f32; 4]>, channels: usize) -> (f32, f32) {
    texels
        .flat_map(|texel| texel[..channels].iter().copied())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut num_threads: Option<usize> = None;
    let mut max_order: Option<u32> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(value::<String>(&args, i, "--config")));
            }
            "--threads" => {
                i += 1;
                num_threads = Some(value(&args, i, "--threads"));
            }
            "--max-order" => {
                i += 1;
                max_order = Some(value(&args, i, "--max-order"));
            }
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match load_config(config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    };
    if num_threads.is_some() {
        config.num_threads = num_threads;
    }
    if let Some(max_order) = max_order {
        config.max_scattering_order = max_order;
    }

    let atmosphere = match Atmosphere::new(&config) {
        Ok(atmosphere) => atmosphere,
        Err(e @ PrecomputeError::ThreadPool(_)) => {
            eprintln!("ERROR: {e}");
            process::exit(2);
        }
        Err(e) => {
            eprintln!("ERROR: invalid configuration: {e}");
            process::exit(1);
        }
    };
    let tables = atmosphere.snapshot();

    println!("\n## Precomputed tables\n");
    println!("| Table | Shape | Min | Max |");
    println!("|-------|-------|-----|-----|");
    for id in tables.ids() {
        let (shape, (lo, hi)) = match tables.get(id) {
            Some(TableRef::Planar(table)) => (
                format!("{:?}", table.shape()),
                range(table.data().iter(), id.channels()),
            ),
            Some(TableRef::Volume(table)) => (
                format!("{:?}", table.shape()),
                range(table.data().iter(), id.channels()),
            ),
            None => continue,
        };
        println!("| {id} | {shape} | {lo:.4e} | {hi:.4e} |");
    }

    log::info!("Precomputation complete.");
}
