//! hoid is a host project manager daemon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use hoi_daemon::{runtime, DEFAULT_CONFIG_PATH, DEFAULT_DATA_PATH, DEFAULT_SOCKET_PATH};

#[derive(Parser, Debug)]
#[command(
    name = "hoid",
    version,
    about = "hoid is a host project manager",
    long_about = None,
)]
struct Cli {
    /// Path to the server configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Path to the socket RPC calls are accepted on.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Path to the store database file.
    #[arg(long, default_value = DEFAULT_DATA_PATH)]
    data: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    runtime::start_blocking(&cli.config, &cli.socket, &cli.data)?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
