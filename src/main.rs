//! edge-proxy: HTTPS-terminating reverse proxy.
//!
//! ```text
//! edge-proxy [--config <path>] [--check]
//! ```
//!
//! Without `--config` the built-in defaults apply (ports 80/443, a single
//! catch-all route to pool `app`), adjusted by `EDGE_*` environment
//! variables.

use std::path::PathBuf;

use clap::Parser;

use edge_proxy::config::load_config;
use edge_proxy::lifecycle;
use edge_proxy::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "edge-proxy", version, about = "HTTPS-terminating edge proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("edge-proxy: {e}");
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability);

    if cli.check {
        tracing::info!(config = ?cli.config, "Configuration OK");
        println!("configuration OK");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        http_address = %config.listener.http_address,
        https_address = %config.listener.https_address,
        tls = config.tls.is_some(),
        upstreams = config.upstreams.len(),
        "edge-proxy starting"
    );

    lifecycle::start(config).await?;
    Ok(())
}
