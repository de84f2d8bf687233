use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod config;
mod console;
mod offline;
mod server;

use config::{load_config, DEFAULT_CONFIG};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "reportfinder", version = VERSION, about = "Find a report and collect its parameters by chat")]
struct Cli {
    #[arg(long, global = true, env = "REPORTFINDER_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the chat and operations API over HTTP.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chat on the terminal.
    Chat {
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path)?;
    let runtime = bootstrap::build(&config).await?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            info!(config = %config_path.display(), "starting server");
            server::serve(runtime.engine, runtime.sessions, &config.sessions, &bind).await
        }
        Commands::Chat { session } => console::run(&runtime.engine, session).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_config_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["reportfinder", "serve", "--config", "x.toml", "--bind", "127.0.0.1:9000"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind.as_deref(), Some("127.0.0.1:9000")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
