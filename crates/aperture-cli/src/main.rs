//! Aperture CLI - reference client for the image-processing service
//!
//! Exercises all four RPCs in order: GetVersion, Upload (client-streaming),
//! Process (server-streaming), and Tune (bidirectional). The Tune call runs
//! its send and receive paths as two independent tasks over the one stream,
//! half-closing the send side once all updates are out and draining
//! previews until the server closes its end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::Request;
use tonic::transport::Channel;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use aperture_grpc::proto::{
    GetVersionRequest, ProcessRequest, TuneRequest, UploadRequest,
    image_processor_client::ImageProcessorClient,
};

/// Chunk size used when streaming the upload, matching the recommended
/// frame bound.
const CHUNK_SIZE: usize = 64 * 1024;

/// Aperture client - drives the streaming image-processing service
#[derive(Parser, Debug)]
#[command(name = "aperture")]
#[command(about = "Client for the Aperture image-processing gRPC service")]
struct Args {
    /// Server endpoint
    #[arg(long, default_value = "http://[::1]:50051")]
    addr: String,

    /// Image file to upload
    #[arg(long)]
    file: PathBuf,

    /// Filters to apply during processing
    #[arg(long, value_delimiter = ',', default_value = "blur,edge")]
    filters: Vec<String>,

    /// Tuning parameters as name:value pairs
    #[arg(long, value_delimiter = ',', default_value = "brightness:1.2,contrast:0.8")]
    params: Vec<String>,

    /// Deadline for the Process call, in seconds
    #[arg(long, default_value_t = 30)]
    process_timeout: u64,

    /// Skip the Process phase
    #[arg(long)]
    no_process: bool,

    /// Skip the Tune phase
    #[arg(long)]
    no_tune: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let mut client = ImageProcessorClient::connect(args.addr.clone())
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;

    get_version(&mut client).await?;

    let image_id = upload_file(&mut client, &args.file).await?;
    println!("Uploaded image ID: {image_id}");

    if !args.no_process {
        process_image(
            &mut client,
            &image_id,
            args.filters.clone(),
            Duration::from_secs(args.process_timeout),
        )
        .await?;
    }

    if !args.no_tune {
        tune_image(&mut client, &image_id, &args.params).await?;
    }

    Ok(())
}

/// Invoke the unary GetVersion RPC.
async fn get_version(client: &mut ImageProcessorClient<Channel>) -> Result<()> {
    let mut request = Request::new(GetVersionRequest {});
    request.set_timeout(Duration::from_secs(1));

    let response = client
        .get_version(request)
        .await
        .context("GetVersion failed")?;
    tracing::info!("service version: {}", response.into_inner().version);
    Ok(())
}

/// Stream the file contents via the client-streaming Upload RPC. The handle
/// is only returned once the server has durably assembled the artifact.
async fn upload_file(client: &mut ImageProcessorClient<Channel>, path: &Path) -> Result<String> {
    tracing::info!("starting upload for {}", path.display());

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let chunks: Vec<UploadRequest> = bytes
        .chunks(CHUNK_SIZE)
        .map(|chunk| UploadRequest {
            chunk: chunk.to_vec(),
        })
        .collect();

    let response = client
        .upload(tokio_stream::iter(chunks))
        .await
        .context("upload failed")?;
    Ok(response.into_inner().image_id)
}

/// Drive the server-streaming Process RPC to completion, logging each
/// progress frame. Normal stream closure is the success terminator.
async fn process_image(
    client: &mut ImageProcessorClient<Channel>,
    image_id: &str,
    filters: Vec<String>,
    timeout: Duration,
) -> Result<()> {
    tracing::info!("processing {} with filters {:?}", image_id, filters);

    let mut request = Request::new(ProcessRequest {
        image_id: image_id.to_string(),
        filters,
    });
    request.set_timeout(timeout);

    let mut progress = client
        .process(request)
        .await
        .context("process failed")?
        .into_inner();

    while let Some(update) = progress.next().await {
        let update = update.context("process stream failed")?;
        tracing::info!("progress {}% - {}", update.percent, update.status);
    }
    tracing::info!("processing done");
    Ok(())
}

/// Run the bidirectional Tune RPC: a spawned task drains previews while
/// this task sends parameter updates, then half-closes and awaits the
/// drain's completion.
async fn tune_image(
    client: &mut ImageProcessorClient<Channel>,
    image_id: &str,
    params: &[String],
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<TuneRequest>(16);

    let response = client
        .tune(ReceiverStream::new(rx))
        .await
        .context("tune init failed")?;
    let mut previews = response.into_inner();

    // Receive path: independent of the send loop, exits when the server
    // closes its end.
    let drain = tokio::spawn(async move {
        while let Some(preview) = previews.next().await {
            let preview = preview?;
            tracing::info!(
                "received preview: {}",
                String::from_utf8_lossy(&preview.preview_chunk)
            );
        }
        Ok::<(), tonic::Status>(())
    });

    // Send path.
    for param in params {
        let (name, value) = parse_param(param)?;
        let request = TuneRequest {
            image_id: image_id.to_string(),
            parameter: name.to_string(),
            value,
        };
        tx.send(request)
            .await
            .context("tune stream closed while sending")?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Half-close: no more updates; previews may still arrive until the
    // server closes its side.
    drop(tx);

    drain
        .await
        .context("tune drain task panicked")?
        .context("tune stream failed")?;
    Ok(())
}

/// Parse one `name:value` tuning parameter.
fn parse_param(param: &str) -> Result<(&str, f64)> {
    let Some((name, raw)) = param.split_once(':') else {
        bail!("invalid parameter {param:?}, expected name:value");
    };
    let value: f64 = raw
        .parse()
        .with_context(|| format!("invalid value in parameter {param:?}"))?;
    Ok((name, value))
}
