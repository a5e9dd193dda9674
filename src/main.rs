//! livecd - builds a bootable Gentoo LiveCD/installer ISO from a stage3 seed.
//!
//! Two drivers share the cached seed and repository snapshot:
//! - `livecd build ...` delegates both image phases to an external builder
//! - `livecd manual ...` provisions, configures and assembles directly

mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::warn;

use livecd_builder::config::Config;
use livecd_builder::pipeline::{DelegatedPlan, ManualTarget};
use livecd_builder::preflight::Driver;
use livecd_builder::signal;

#[derive(Parser)]
#[command(name = "livecd")]
#[command(about = "Gentoo LiveCD/installer ISO builder")]
#[command(
    after_help = "QUICK START:\n  livecd preflight         Check host tools and inputs\n  livecd build --all       Build via the external builder\n  livecd manual all        Build without it\n  livecd clean             Remove the work area"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tool-delegated pipeline. Steps run in the order
    /// clean, fetch-seed, snapshot, stage3, livecd.
    Build {
        /// Download the stage3 seed (no-op when cached)
        #[arg(long)]
        fetch_seed: bool,
        /// Snapshot the package repository (no-op when present)
        #[arg(long)]
        snapshot: bool,
        /// Builder phase one: the live root filesystem
        #[arg(long)]
        stage3: bool,
        /// Builder phase two: the ISO, then publish it
        #[arg(long)]
        livecd: bool,
        /// fetch-seed + snapshot + stage3 + livecd
        #[arg(long)]
        all: bool,
        /// Remove the work area first
        #[arg(long)]
        clean: bool,
    },

    /// Run the manual pipeline on the directly managed build root
    Manual {
        #[arg(value_enum)]
        target: ManualStage,
    },

    /// Download and cache the stage3 seed
    FetchSeed,

    /// Build the repository snapshot
    Snapshot,

    /// Remove the work area (keeps seeds, snapshots and published images)
    Clean,

    /// Run preflight checks
    Preflight {
        /// Exit nonzero if any check fails
        #[arg(long)]
        strict: bool,
        /// Check for the delegated driver instead of the manual one
        #[arg(long)]
        delegated: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ManualStage {
    /// Provision, configure and install packages
    Stage1,
    /// Assemble and publish the ISO
    Stage2,
    /// stage1 then stage2
    All,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show the effective configuration
    Config,
    /// Show cached inputs, build root, mounts and the last image
    Status,
}

fn main() {
    let cli = Cli::parse();

    // Load .env if present; real environment variables take precedence.
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    if let Err(e) = signal::install_handlers() {
        warn!(error = %e, "could not install signal handlers; interrupts will skip teardown");
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("livecd={level},livecd_builder={level}")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load();

    match cli.command {
        Commands::Build {
            fetch_seed,
            snapshot,
            stage3,
            livecd,
            all,
            clean,
        } => {
            let mut plan = if all { DelegatedPlan::all() } else { DelegatedPlan::default() };
            plan.clean |= clean;
            plan.fetch_seed |= fetch_seed;
            plan.snapshot |= snapshot;
            plan.stage3 |= stage3;
            plan.livecd |= livecd;
            commands::cmd_build(&config, plan)?;
        }

        Commands::Manual { target } => {
            let target = match target {
                ManualStage::Stage1 => ManualTarget::Stage1,
                ManualStage::Stage2 => ManualTarget::Stage2,
                ManualStage::All => ManualTarget::All,
            };
            commands::cmd_manual(&config, target)?;
        }

        Commands::FetchSeed => commands::cmd_fetch_seed(&config)?,

        Commands::Snapshot => commands::cmd_snapshot(&config)?,

        Commands::Clean => commands::cmd_clean(&config)?,

        Commands::Preflight { strict, delegated } => {
            let driver = if delegated { Driver::Delegated } else { Driver::Manual };
            commands::cmd_preflight(&config, driver, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Status => commands::show::ShowTarget::Status,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
