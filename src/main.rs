use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tinytel::net::ConnectTarget;
use tinytel::session;
use tinytel::term::Tty;

/// Minimal interactive telnet client.
#[derive(Debug, Parser)]
#[command(name = "tinytel", version, about)]
struct Args {
    /// Remote hostname or address to connect to.
    host: String,

    /// Remote port.
    #[arg(long, default_value_t = 23)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so session output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TINYTEL_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let target = ConnectTarget {
        host: args.host,
        port: args.port,
    };

    session::run(target, Tty::new()).await?;
    Ok(())
}
