//! cors-relay binary.
//!
//! ```text
//!     Browser ──▶ GET /?url=https://api.example.com/v1 ──▶ relay ──▶ origin
//!     Browser ◀── origin status + filtered headers + CORS ◀── relay ◀──┘
//! ```
//!
//! Configuration comes from an optional TOML file; command-line flags
//! override individual fields.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cors_relay::config::{self, ProxyConfig};
use cors_relay::lifecycle::startup;
use cors_relay::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "cors-relay", version, about = "Stateless CORS relay proxy")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "CORS_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Accept any upstream certificate.
    #[arg(long)]
    insecure_skip_tls_verify: bool,

    /// Log level, overriding `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if self.insecure_skip_tls_verify {
            config.upstream.verify_tls = false;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

/// File values first, then command-line overrides, then validation.
fn build_config(cli: &Cli) -> Result<ProxyConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        verify_tls = config.upstream.verify_tls,
        connect_timeout_secs = config.upstream.connect_timeout_secs,
        "cors-relay starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
