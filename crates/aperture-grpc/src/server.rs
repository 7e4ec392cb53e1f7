//! Server configuration and runner.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use aperture::{ImageStore, SimulatedWork};

use crate::instrument::{CallRecorder, Instrumented};
use crate::proto::image_processor_server::ImageProcessorServer;
use crate::service::ImageProcessorService;

/// Version string reported by GetVersion, fixed for the process lifetime.
pub const SERVICE_VERSION: &str = "v0.1.0";

/// Server configuration and runner.
#[derive(Debug)]
pub struct ImageServer {
    addr: SocketAddr,
    upload_dir: PathBuf,
}

impl ImageServer {
    /// Create a new server bound to the given address, storing uploads
    /// under `upload_dir`.
    pub fn new(addr: SocketAddr, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            addr,
            upload_dir: upload_dir.into(),
        }
    }

    /// Run the server until shutdown signal.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let store = ImageStore::open(&self.upload_dir).await?;
        let service =
            ImageProcessorService::new(SERVICE_VERSION, store, Arc::new(SimulatedWork::default()));
        let recorder = Arc::new(CallRecorder::new());
        let instrumented = Instrumented::new(service, recorder);

        tracing::info!(
            "Starting gRPC server on {} (uploads in {})",
            self.addr,
            self.upload_dir.display()
        );

        tonic::transport::Server::builder()
            .add_service(ImageProcessorServer::new(instrumented))
            .serve_with_shutdown(self.addr, shutdown_signal())
            .await?;

        tracing::info!("gRPC server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                // Fall through to let ctrl_c handle shutdown
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
