mod render;
mod search;
mod splash;

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "careconnect")]
#[command(about = "Find community resources near you")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single search and print the results
    Search {
        /// What resources are you looking for (e.g. "food bank")
        query: String,
        #[command(flatten)]
        opts: SearchOpts,
    },
    /// Read queries from stdin, one per line, in a single session
    Interactive {
        #[command(flatten)]
        opts: SearchOpts,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Debug, Args)]
struct SearchOpts {
    /// Backend address, overrides `CARECONNECT_SERVER_ADDR`
    #[arg(long)]
    server: Option<SocketAddr>,
    /// Device latitude; without `--lat`/`--lng` the device reports no fix
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Device longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Location permission the device reports
    #[arg(long, value_enum, default_value_t = PermissionArg::Prompt)]
    permission: PermissionArg,
    /// Answer location prompts automatically instead of asking on stdin
    #[arg(long, value_enum)]
    consent: Option<ConsentArg>,
    /// Skip the cold-start notice
    #[arg(long)]
    no_splash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PermissionArg {
    Granted,
    Prompt,
    Denied,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConsentArg {
    Allow,
    Decline,
    Without,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = careconnect_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Search { query, opts } => search::run_search(&config, &opts, query).await,
        Commands::Interactive { opts } => search::run_interactive(&config, &opts).await,
        Commands::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}
