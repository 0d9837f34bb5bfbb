//! Walter room server - entry point.

use std::path::PathBuf;

use anyhow::Context;
use walter_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use walter_server::{shutdown, WalterServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("walter-server {}", walter_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r#"Walter - WebSocket room server

USAGE:
    walter-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    WALTER__SERVER__BIND_ADDR               Listener address (default: 0.0.0.0:3000)
    WALTER__SERVER__MAX_CONNECTIONS         Connection limit (default: 10000)
    WALTER__SERVER__STATUS_INTERVAL_SECS    Status push interval, or "none"
    WALTER__ROOMS                           Comma-separated rooms (default: lobby)
    WALTER__TELEMETRY__LOGGING__FORMAT      "pretty" or "json"
    WALTER__TELEMETRY__METRICS__ENABLED     Expose Prometheus metrics
    RUST_LOG                               Log filter, overrides the configured level

A .env file in the working directory is read before the environment.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = &args.config {
        loader = loader.with_file(path)?;
    }
    let config = loader
        .with_dotenv()?
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    walter_telemetry::init_telemetry(&config.telemetry.to_telemetry_config())
        .context("failed to initialize telemetry")?;

    tracing::info!(
        version = walter_server::VERSION,
        config = ?args.config,
        "Starting Walter room server"
    );

    WalterServer::new(config)?
        .run(shutdown::wait_for_os_signal())
        .await
}
