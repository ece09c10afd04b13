//! Entry point for the panel agent. Parses args, sets up logging and serves.

use std::env;

use panel_agent::config::{ArgsError, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::load(env::args()) {
        Ok(c) => c,
        Err(ArgsError::Help(usage)) => {
            println!("{usage}");
            return Ok(());
        }
        Err(e @ ArgsError::Invalid(_)) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("panel_agent=info")),
        )
        .init();

    panel_agent::server::serve(config).await
}
