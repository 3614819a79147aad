use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nestegg::api::{ApiConfig, run_http_server};
use nestegg::core::DEFAULT_SIMULATIONS;

#[derive(Parser, Debug)]
#[command(name = "nestegg", about = "Retirement planning simulation service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(
            long,
            default_value_t = 5_000,
            help = "Wall-clock budget per simulation run in milliseconds"
        )]
        budget_ms: u64,
        #[arg(
            long,
            default_value_t = DEFAULT_SIMULATIONS,
            help = "Trial count used when a request does not specify one"
        )]
        simulations: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            port,
            budget_ms,
            simulations,
        } => {
            let config = ApiConfig {
                budget_ms,
                default_simulations: simulations,
            };
            if let Err(e) = run_http_server(port, config).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
