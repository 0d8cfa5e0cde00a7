//! hartcap CLI: device tree in, RISC-V Hart Capabilities Table out.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hartcap",
    version,
    about = "Generate ACPI RHCT tables from RISC-V device trees"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an RHCT from a device tree blob
    Build {
        /// Flattened device tree blob (.dtb)
        #[arg(long)]
        dtb: PathBuf,
        /// Platform overrides (.platform.toml)
        #[arg(long)]
        platform: Option<PathBuf>,
        /// Output path (default: <dtb>.rhct)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve harts and interrupt controllers without building a table
    Resolve {
        /// Flattened device tree blob (.dtb)
        #[arg(long)]
        dtb: PathBuf,
        /// Print the resolved records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode and print an RHCT
    Inspect {
        /// Table file
        table: PathBuf,
        /// Print the decoded table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage platform override files
    Platform {
        #[command(subcommand)]
        action: PlatformAction,
    },
}

#[derive(Subcommand)]
enum PlatformAction {
    /// Print a template .platform.toml
    Template {
        /// Platform name
        name: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a .platform.toml
    Validate {
        /// Platform file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

/// `HARTCAP_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("HARTCAP_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            dtb,
            platform,
            output,
        } => commands::build::run(&dtb, platform.as_deref(), output.as_deref()),

        Commands::Resolve { dtb, json } => commands::resolve::run(&dtb, json),

        Commands::Inspect { table, json } => commands::inspect::run(&table, json),

        Commands::Platform { action } => match action {
            PlatformAction::Template { name, output } => {
                commands::platform::template(&name, output.as_deref())
            }
            PlatformAction::Validate { file } => commands::platform::validate(&file),
        },
    }
}
