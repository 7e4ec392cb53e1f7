//! gRPC service implementation for the ImageProcessor service.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

use aperture::{ImageError, ImageStore, SessionRegistry, WorkModel, render_preview};

use crate::proto::{
    GetVersionRequest, ProcessRequest, ProgressUpdate, TuneRequest, TuneResponse, UploadRequest,
    UploadResponse, VersionResponse, image_processor_server::ImageProcessor,
};

/// The ImageProcessor gRPC service implementation.
///
/// Holds the session registry, the artifact store, and the work model; all
/// three are shared across concurrently open calls.
#[derive(Clone)]
pub struct ImageProcessorService {
    version: String,
    registry: Arc<SessionRegistry>,
    store: ImageStore,
    work: Arc<dyn WorkModel>,
}

impl std::fmt::Debug for ImageProcessorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessorService")
            .field("version", &self.version)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ImageProcessorService {
    /// Create a service with a fresh registry over the given store and
    /// work model.
    pub fn new(version: impl Into<String>, store: ImageStore, work: Arc<dyn WorkModel>) -> Self {
        Self {
            version: version.into(),
            registry: Arc::new(SessionRegistry::new()),
            store,
            work,
        }
    }

    /// The registry backing this service instance.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

/// Map a domain error onto the gRPC status taxonomy.
fn status_from(err: ImageError) -> Status {
    match err {
        ImageError::InvalidInput(msg) => Status::invalid_argument(msg),
        ImageError::UnknownImage(id) => Status::not_found(format!("unknown image: {id}")),
        ImageError::Io(e) => Status::internal(format!("storage error: {e}")),
        ImageError::Internal(msg) => Status::internal(msg),
    }
}

type ProcessStream = Pin<Box<dyn Stream<Item = Result<ProgressUpdate, Status>> + Send>>;
type TuneStream = Pin<Box<dyn Stream<Item = Result<TuneResponse, Status>> + Send>>;

#[tonic::async_trait]
impl ImageProcessor for ImageProcessorService {
    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        Ok(Response::new(VersionResponse {
            version: self.version.clone(),
        }))
    }

    async fn upload(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let mut chunks = request.into_inner();

        // The handle exists from the start so partial writes are
        // attributable, but it is only revealed to the caller on success.
        let image_id = self.registry.issue();
        tracing::info!("upload started: {}", image_id);

        let mut sink = self.store.begin(&image_id).await.map_err(status_from)?;

        loop {
            match chunks.next().await {
                Some(Ok(frame)) => {
                    if let Err(e) = sink.write_chunk(&frame.chunk).await {
                        sink.abort().await;
                        return Err(status_from(e));
                    }
                }
                Some(Err(status)) => {
                    tracing::warn!("upload recv error for {}: {}", image_id, status);
                    sink.abort().await;
                    return Err(status);
                }
                // Normal end-of-input, with zero or more chunks received.
                None => break,
            }
        }

        let artifact = sink.finish().await.map_err(status_from)?;
        let size = artifact.size;
        self.registry
            .commit(&image_id, artifact)
            .map_err(status_from)?;

        tracing::info!("upload completed: {} ({} bytes)", image_id, size);
        Ok(Response::new(UploadResponse { image_id }))
    }

    type ProcessStream = ProcessStream;

    async fn process(
        &self,
        request: Request<ProcessRequest>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let req = request.into_inner();

        // Validate before emitting any frame; unknown handles fail the
        // call with no partial stream.
        self.registry.resolve(&req.image_id).map_err(status_from)?;

        tracing::info!(
            "processing {} with filters {:?}",
            req.image_id,
            req.filters
        );

        let work = self.work.clone();
        let (tx, rx) = mpsc::channel::<ProgressUpdate>(16);

        tokio::spawn(async move {
            let steps = work.steps();
            for step in 0..=steps {
                work.run_step(step).await;
                let percent = aperture::percent_at(step, steps);
                let update = ProgressUpdate {
                    percent,
                    status: format!("{percent}% complete"),
                };
                // A gone receiver means the caller cancelled or the call
                // hit its deadline; stop at this frame boundary.
                if tx.send(update).await.is_err() {
                    tracing::debug!("progress receiver gone for {}, stopping", req.image_id);
                    return;
                }
            }
            tracing::info!("processing completed: {}", req.image_id);
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream.map(Ok)) as ProcessStream))
    }

    type TuneStream = TuneStream;

    async fn tune(
        &self,
        request: Request<Streaming<TuneRequest>>,
    ) -> Result<Response<Self::TuneStream>, Status> {
        let mut inbound = request.into_inner();
        let registry = self.registry.clone();
        let (tx, rx) = mpsc::channel::<Result<TuneResponse, Status>>(16);

        // Single-threaded per call: receive one update, answer it with
        // exactly one preview, then read the next. The outbound stream
        // closes when the client half-closes (tx dropped at loop end).
        tokio::spawn(async move {
            while let Some(next) = inbound.next().await {
                let frame = match next {
                    Ok(frame) => frame,
                    Err(status) => {
                        tracing::warn!("tune recv error: {}", status);
                        break;
                    }
                };

                if let Err(e) = registry.resolve(&frame.image_id) {
                    let _ = tx.send(Err(status_from(e))).await;
                    return;
                }

                tracing::info!(
                    "tune request: {} = {} on image {}",
                    frame.parameter,
                    frame.value,
                    frame.image_id
                );
                let preview = render_preview(&frame.image_id, &frame.parameter, frame.value);
                if tx
                    .send(Ok(TuneResponse {
                        preview_chunk: preview,
                    }))
                    .await
                    .is_err()
                {
                    // Caller stopped reading previews.
                    return;
                }
            }
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as TuneStream))
    }
}
