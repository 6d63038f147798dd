mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiln_core::{JitConfig, Mangler, TargetDescriptor};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Kiln - in-process JIT for Cranelift IR modules")]
#[command(version = "0.1.0")]
#[command(author = "Gianluca Brigandi <gbrigand@gmail.com>")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe the code-generation target
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Show the linker-visible form of symbol names
    Mangle {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(short, long)]
        target: Option<String>,
    },

    /// Compile, link and run a few sample modules
    Demo {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { config, json } => {
            init_logging(false);
            cmd_info(config.as_deref(), json)
        }
        Commands::Mangle { names, target } => {
            init_logging(false);
            cmd_mangle(&names, target)
        }
        Commands::Demo { config, verbose } => {
            init_logging(verbose);
            cmd_demo(config.as_deref(), verbose)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<JitConfig> {
    match path {
        Some(path) => JitConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(JitConfig::default()),
    }
}

fn cmd_info(config: Option<&Path>, json: bool) -> Result<()> {
    use colored::*;

    let config = load_config(config)?;
    let target = TargetDescriptor::from_config(&config)?;
    let summary = target.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", " Kiln Target".bright_blue().bold());
    println!("{}", "=".repeat(50).bright_blue());
    println!(" Triple: {}", summary.triple);
    println!(" Pointer width: {} bits", summary.pointer_bits);
    println!(" Endianness: {:?}", summary.endianness);
    println!(
        " Global prefix: {}",
        summary
            .global_prefix
            .map(|prefix| format!("'{}'", prefix))
            .unwrap_or_else(|| "none".to_string())
    );
    println!(" Calling convention: {}", summary.call_conv);
    println!(" Optimization: {}", summary.opt_level);
    let runnable = if summary.is_host {
        "yes".bright_green()
    } else {
        "no".yellow()
    };
    println!(" Runs in this process: {}", runnable);

    Ok(())
}

fn cmd_mangle(names: &[String], target: Option<String>) -> Result<()> {
    let config = JitConfig {
        target,
        ..JitConfig::default()
    };
    let target = TargetDescriptor::from_config(&config)?;

    for name in names {
        println!("{} => {}", name, Mangler::mangle(name, target.data_layout()));
    }
    Ok(())
}

fn cmd_demo(config: Option<&Path>, verbose: bool) -> Result<()> {
    use colored::*;

    let config = load_config(config)?;
    if verbose {
        println!("{}", " Kiln JIT Demo".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_cyan());
        println!(" Config: {}", config.to_json()?);
        println!();
    }

    tracing::debug!(?config, "running demo scenarios");
    let outcomes = demo::run(&config)?;
    let mut failures = 0;
    for outcome in &outcomes {
        let status = match outcome.status() {
            demo::Status::Passed => " PASS".bright_green().bold(),
            demo::Status::Failed => {
                failures += 1;
                " FAIL".bright_red().bold()
            }
            demo::Status::Skipped => " SKIP".yellow().bold(),
        };
        println!("{} {}: {}", status, outcome.name, outcome.detail());
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{} demo scenario(s) failed", failures));
    }
    Ok(())
}
