use crate::server;
use crate::simulate::{run_simulation, SimulateArgs};
use clap::{Args, Parser, Subcommand};
use lead_scoring::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Scoring Service",
    about = "Score visitor engagement and track lead status from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Replay a trigger sequence through an in-memory engine and print each step
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// SQLite file for profile storage; in-memory when omitted
    #[arg(long)]
    pub(crate) storage_path: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Simulate(args) => run_simulation(args),
    }
}
