//! tierd - Redis-compatible RESP development server

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpStream;
use tracing::info;

use tierd::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    bind: String,

    /// Health check mode
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting tierd v{}", env!("CARGO_PKG_VERSION"));

    let server = Server::bind(&args.bind).await?;
    println!("\ntierd ready");
    println!("   Connection String: redis://{}", server.local_addr()?);
    println!("   Press Ctrl+C to stop\n");

    tokio::select! {
        result = server.serve() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
