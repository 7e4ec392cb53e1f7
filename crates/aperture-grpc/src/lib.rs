//! Aperture gRPC Server
//!
//! Exposes remote image processing as one gRPC service with all four call
//! shapes:
//!
//! - `GetVersion` — unary status query.
//! - `Upload` — client-streaming ingest of image chunks; returns an opaque
//!   image handle once the caller half-closes.
//! - `Process` — server-streaming progress for a simulated processing job
//!   against a previously uploaded handle.
//! - `Tune` — bidirectional parameter tuning; exactly one preview frame per
//!   accepted update.
//!
//! # Example flow
//!
//! ```text
//! Client                                    Server
//! │                                           │
//! │  UploadRequest{chunk} × N, half-close     │
//! │ ─────────────────────────────────────────>│
//! │          UploadResponse{image_id}         │
//! │<───────────────────────────────────────── │
//! │                                           │
//! │  ProcessRequest{image_id, filters}        │
//! │ ─────────────────────────────────────────>│
//! │  ProgressUpdate{0%} .. {100%}, close      │
//! │<───────────────────────────────────────── │
//! │                                           │
//! │  TuneRequest{image_id, param, value}      │
//! │ ─────────────────────────────────────────>│
//! │       TuneResponse{preview_chunk}         │
//! │<───────────────────────────────────────── │
//! ```
//!
//! Every call, streaming or not, passes through the [`Instrumented`]
//! decorator, which records method, duration, and terminal outcome exactly
//! once per call.

pub mod proto {
    #![allow(missing_docs)]
    #![allow(clippy::doc_markdown)]
    tonic::include_proto!("aperture.v1");
}

mod instrument;
mod server;
mod service;

pub use instrument::{CallRecord, CallRecorder, Instrumented, TimedStream};
pub use server::{ImageServer, SERVICE_VERSION};
pub use service::ImageProcessorService;

// Re-export proto types for convenience
pub use proto::{
    ProcessRequest, ProgressUpdate, TuneRequest, TuneResponse, UploadRequest, UploadResponse,
    image_processor_client::ImageProcessorClient,
    image_processor_server::ImageProcessorServer as ImageProcessorGrpcServer,
};
