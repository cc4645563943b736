//! # satchel CLI - bag, check, and inspect BagIt bags
//!
//! A thin command-line wrapper over the satchel library.
//!
//! ## Usage
//! ```bash
//! # Turn the current directory into a bag, in place
//! satchel create
//!
//! # Verify a bag, collecting every error
//! satchel verify -p /archives/collection-42
//!
//! # Quick completeness check (no digests computed)
//! satchel verify --oxum-only
//!
//! # Show a bag's metadata
//! satchel info
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use satchel::{Bag, BagBuilder, BagError, VerifyOptions};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// satchel - BagIt packaging and verification for preservation workflows
#[derive(Parser)]
#[command(name = "satchel")]
#[command(version)]
#[command(about = "Create, complete, and verify BagIt bags")]
#[command(long_about = None)]
struct Cli {
    /// Bag directory (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a bag in place from a directory of files
    Create {
        /// Checksum algorithms to write manifests for (defaults to md5 and sha256)
        #[arg(short, long = "algorithm")]
        algorithms: Vec<String>,

        /// bag-info.txt fields, each as "Label: value"
        #[arg(short, long = "info")]
        info_fields: Vec<String>,
    },

    /// Verify a bag's manifests against its contents
    #[command(alias = "check")]
    Verify {
        /// Stop at the first checksum mismatch instead of collecting all
        #[arg(long)]
        fail_fast: bool,

        /// Only compare the payload against the declared Payload-Oxum
        #[arg(long)]
        oxum_only: bool,

        /// Emit the verification report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a bag's declaration and metadata
    Info {
        /// Emit the metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let root = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Create {
            algorithms,
            info_fields,
        } => cmd_create(root, algorithms, info_fields),
        Commands::Verify {
            fail_fast,
            oxum_only,
            json,
        } => cmd_verify(root, fail_fast, oxum_only, json),
        Commands::Info { json } => cmd_info(root, json),
    }
}

/// Create (or complete in place) a bag
fn cmd_create(root: PathBuf, algorithms: Vec<String>, info_fields: Vec<String>) -> anyhow::Result<()> {
    println!("{}", "Bagging...".blue().bold());

    let mut builder = BagBuilder::new();
    if !algorithms.is_empty() {
        builder = builder.algorithms(algorithms);
    }
    for field in &info_fields {
        let (label, value) = field
            .split_once(':')
            .with_context(|| format!("--info must look like \"Label: value\", got {field:?}"))?;
        builder = builder.info_field(label.trim(), value.trim());
    }

    let start = Instant::now();
    let bag = builder.create(root.clone())?;

    println!(
        "{} Bagged {}",
        "✓".green().bold(),
        root.display().to_string().cyan()
    );
    println!(
        "  Payload-Oxum: {}",
        bag.info().first("Payload-Oxum").unwrap_or("?")
    );
    println!("  Bag-Size: {}", bag.info().first("Bag-Size").unwrap_or("?"));
    println!("  Algorithms: {}", bag.registry().names().join(", "));
    println!("  Took: {:.2?}", start.elapsed());

    Ok(())
}

/// Verify a bag, either fully or oxum-only
fn cmd_verify(root: PathBuf, fail_fast: bool, oxum_only: bool, json: bool) -> anyhow::Result<()> {
    let bag = Bag::open(root)?;

    if oxum_only {
        bag.verify_oxum()?;
        println!("{} Payload-Oxum matches the payload", "✓".green().bold());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Computing digests...");

    let outcome = bag.verify(VerifyOptions {
        return_all_errors: !fail_fast,
    });
    spinner.finish_and_clear();

    match outcome {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} Bag is valid: {}", "✓".green().bold(), report.summary());
                for skipped in &report.unverifiable {
                    println!(
                        "  {} {} skipped: no implementation registered for {}",
                        "!".yellow().bold(),
                        skipped.manifest,
                        skipped.algorithm
                    );
                }
            }
            Ok(())
        }
        Err(BagError::Invalid(report)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} Bag is invalid: {}", "✗".red().bold(), report.summary());
                for m in &report.mismatches {
                    println!(
                        "  {} {} ({}, {}): expected {}, actual {}",
                        "✗".red(),
                        m.path,
                        m.algorithm,
                        m.manifest,
                        m.expected,
                        m.actual
                    );
                }
                for m in &report.missing {
                    println!(
                        "  {} missing: {} (listed in {})",
                        "✗".red(),
                        m.path,
                        m.manifest
                    );
                }
                for path in &report.unexpected {
                    println!("  {} unexpected: {}", "✗".red(), path);
                }
            }
            std::process::exit(1);
        }
        Err(
            e @ (BagError::ChecksumMismatch { .. }
            | BagError::MissingFile { .. }
            | BagError::UnexpectedFile { .. }),
        ) => {
            println!("{} Bag is invalid: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Show a bag's declaration and metadata
fn cmd_info(root: PathBuf, json: bool) -> anyhow::Result<()> {
    let bag = Bag::open(root)?;

    if json {
        println!("{}", serde_json::to_string_pretty(bag.info())?);
        return Ok(());
    }

    println!("{}", "Bag".blue().bold());
    println!("  Root: {}", bag.root().display().to_string().cyan());
    println!("  Version: {}", bag.version());
    println!("  Algorithms: {}", bag.registry().names().join(", "));
    match bag.payload_oxum() {
        Ok(oxum) => println!("  Payload: {} file(s), {} byte(s)", oxum.streams, oxum.octets),
        Err(e) => println!("  Payload: {}", format!("unavailable ({e})").yellow()),
    }

    if !bag.info().is_empty() {
        println!("\n{}", "bag-info.txt".blue().bold());
        for field in bag.info().fields() {
            println!("  {}: {}", field.label.cyan(), field.value);
        }
    }

    Ok(())
}
