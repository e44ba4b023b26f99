use anyhow::Result;
use clap::Parser;
use socks5d::Socks5Server;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A lightweight SOCKS5 proxy", long_about = None)]
struct Args {
    /// IP address to listen on
    #[arg(default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    ip: IpAddr,

    /// Port to listen on
    #[arg(default_value_t = 1080)]
    port: u16,

    /// Give up on a destination after this many seconds
    #[arg(short = 't', long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let mut server = Socks5Server::new(SocketAddr::new(args.ip, args.port))
        .with_connect_timeout(args.connect_timeout.map(Duration::from_secs));

    info!("starting server");
    server.bind().await?;

    tokio::select! {
        res = server.run() => res,
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutdown signal received");
            Ok(())
        }
    }
}
