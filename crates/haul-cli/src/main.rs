#![forbid(unsafe_code)]

mod cmd;
mod credentials;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "haul: one-way workspace migrator between remote Terraform backends",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Migrate workspaces to the target backend",
        long_about = "Migrate matching source workspaces: create the target workspace, \
                      transfer the latest state and all variables, lock the source, and \
                      patch local build artifacts.",
        after_help = "EXAMPLES:\n    # Migrate every workspace of one project\n    haul migrate --workspace-filter 'orders-*' --project-root ~/src/infra \\\n        --account-id acc-1 --vcs-provider vcs-1 --target-hostname backend.example.com \\\n        --organization acme --secret-prefix /infra/backends\n\n    # Emit machine-readable output\n    haul migrate … --json"
    )]
    Migrate(cmd::migrate::MigrateArgs),

    #[command(
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    haul completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HAUL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "haul=debug,info"
        } else {
            "haul=info,warn"
        })
    });

    let format = env::var("HAUL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Migrate(args) => {
            let output = if args.json {
                OutputMode::Json
            } else {
                OutputMode::Human
            };
            let summary = cmd::migrate::run_migrate(&args, output)?;
            // Per-workspace failures do not abort the run, but CI callers
            // still need to see them in the exit status.
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())?;
        }
    }

    Ok(())
}
