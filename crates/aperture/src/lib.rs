//! Aperture: core types for a streaming image-processing service
//!
//! This crate holds the transport-independent pieces of the service: the
//! session registry that issues and resolves opaque image handles, the
//! artifact store that assembles uploaded chunks into immutable files, and
//! the pluggable work model that paces simulated processing. The gRPC
//! surface lives in `aperture-grpc`.

mod error;
mod registry;
mod store;
mod work;

pub use error::ImageError;
pub use registry::{ArtifactRef, ImageId, SessionRegistry};
pub use store::{ImageStore, UploadSink};
pub use work::{SimulatedWork, WorkModel, percent_at, render_preview};
