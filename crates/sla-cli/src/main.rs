mod cmd;
mod context;
mod output;
mod runtime;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, tracker::TrackerSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sla-poller",
    about = "Watch SLA trackers and alert when a deadline passes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Tracker database file
    #[arg(long, global = true, env = "SLA_DB_PATH", default_value = context::DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Config file (default: .sla/config.yaml when present)
    #[arg(long, global = true, env = "SLA_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller until interrupted
    Run {
        /// Status API port
        #[arg(long, env = "SLA_STATUS_PORT", default_value = "3142")]
        port: u16,
        /// Don't serve the status API
        #[arg(long)]
        no_server: bool,
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single poll pass and print what it did
    Tick {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage SLA trackers
    Tracker {
        #[command(subcommand)]
        subcommand: TrackerSubcommand,
    },

    /// Render a notification template to stdout
    Render {
        /// Template family: email or teams
        #[arg(long)]
        kind: String,
        /// Template name
        #[arg(long, default_value = sla_server::BREACH_TEMPLATE)]
        name: String,
        /// Template values as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Inspect and initialize configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Tick { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run {
            port,
            no_server,
            dry_run,
        } => cmd::run::run(&cli.db, config_path, port, no_server, dry_run),
        Commands::Tick { dry_run } => cmd::tick::run(&cli.db, config_path, dry_run, cli.json),
        Commands::Tracker { subcommand } => cmd::tracker::run(&cli.db, subcommand, cli.json),
        Commands::Render { kind, name, set } => {
            cmd::render::run(config_path, &kind, &name, &set)
        }
        Commands::Config { subcommand } => cmd::config::run(config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
