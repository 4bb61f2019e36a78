//! fff-slicer CLI.
//!
//! Usage:
//!   fff-slicer <input.stl>... -o <output.gcode> [-s key=value]...
//!
//! Every `-s` option maps onto one configuration key; unknown keys
//! warn, malformed values fail before any file is touched.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fff_slicer::config::Settings;
use fff_slicer::pipeline::Session;
use log::LevelFilter;
use std::path::PathBuf;

/// FFF slicer: triangle meshes in, printer G-code out
#[derive(Parser, Debug)]
#[command(name = "fff-slicer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input STL files; multiple files become the volumes of one
    /// multi-extruder object
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output G-code file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Set a configuration option (repeatable)
    #[arg(short = 's', value_name = "KEY=VALUE")]
    settings: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let mut settings = Settings::default();
    for option in &cli.settings {
        let Some((key, value)) = option.split_once('=') else {
            bail!("malformed -s option (expected key=value): {}", option);
        };
        settings
            .set(key.trim(), value)
            .with_context(|| format!("bad value for {}", key))?;
    }

    let mut session = Session::new(settings, &cli.output)
        .with_context(|| format!("cannot open {}", cli.output.display()))?;

    session
        .process_files(&cli.inputs, true)
        .context("slicing failed")?;
    session.finalize().context("finalizing output failed")?;

    println!("G-code written to {}", cli.output.display());
    Ok(())
}
