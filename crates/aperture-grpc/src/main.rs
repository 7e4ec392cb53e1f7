//! Aperture gRPC Server
//!
//! Runs the image-processing service: client-streaming upload,
//! server-streaming progress, bidirectional tuning, and a unary version
//! query, with per-call instrumentation.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use aperture_grpc::ImageServer;

/// Aperture gRPC Server - streaming image processing
#[derive(Parser, Debug)]
#[command(name = "aperture-grpc")]
#[command(about = "gRPC server providing streaming image processing")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "[::1]:50051")]
    addr: SocketAddr,

    /// Directory where uploaded artifacts are stored
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let server = ImageServer::new(args.addr, args.upload_dir);
    server.run().await?;

    Ok(())
}
