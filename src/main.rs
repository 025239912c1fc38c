//! fieldset - inspect hierarchical field set records
//!
//! Reads records from a file or stdin and dumps, queries, or walks them.

use fieldset_core::{run_command, Config};
use std::error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse CLI arguments and build config
    let (config, command) = Config::from_cli()?;

    // Initialize logging
    init_logging(&config.log_level);

    tracing::debug!("Running {:?} with {:?}", command, config);

    if let Err(e) = run_command(&config, &command, &mut std::io::stdout()).await {
        tracing::error!("Command failed: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
