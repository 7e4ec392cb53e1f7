//! Call instrumentation: a decorator around the service that records every
//! call's method, duration, and terminal outcome exactly once.
//!
//! Unary and client-streaming calls terminate when the handler returns.
//! Server-streaming and bidirectional calls terminate when their response
//! stream ends, fails, or is dropped (client cancellation); the wrapped
//! stream records whichever happens first.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio_stream::Stream;
use tonic::{Code, Request, Response, Status, Streaming};

use crate::proto::{
    GetVersionRequest, ProcessRequest, TuneRequest, UploadRequest, UploadResponse,
    VersionResponse, image_processor_server::ImageProcessor,
};

/// One completed call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Method name, e.g. `"Process"`.
    pub method: &'static str,
    /// Wall time from dispatch to terminal.
    pub elapsed: Duration,
    /// `Ok` on clean completion, otherwise the terminal status code.
    /// A dropped response stream records `Code::Cancelled`.
    pub outcome: Result<(), Code>,
}

/// Collects one [`CallRecord`] per completed call.
#[derive(Debug, Default)]
pub struct CallRecorder {
    entries: Mutex<Vec<CallRecord>>,
}

impl CallRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, method: &'static str, elapsed: Duration, outcome: Result<(), Code>) {
        match outcome {
            Ok(()) => tracing::info!("{} took {:?}; ok", method, elapsed),
            Err(code) => tracing::info!("{} took {:?}; err={:?}", method, elapsed, code),
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(CallRecord {
                method,
                elapsed,
                outcome,
            });
        }
    }

    /// Snapshot of all records so far.
    pub fn entries(&self) -> Vec<CallRecord> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of completed calls recorded for `method`.
    pub fn count_for(&self, method: &str) -> usize {
        self.entries().iter().filter(|r| r.method == method).count()
    }
}

/// Timer for one in-flight call; consumed exactly once at the terminal.
#[derive(Debug)]
struct CallTimer {
    recorder: Arc<CallRecorder>,
    method: &'static str,
    started: Instant,
}

impl CallTimer {
    fn start(recorder: Arc<CallRecorder>, method: &'static str) -> Self {
        Self {
            recorder,
            method,
            started: Instant::now(),
        }
    }

    fn finish(self, outcome: Result<(), Code>) {
        self.recorder
            .record(self.method, self.started.elapsed(), outcome);
    }
}

/// Response stream wrapper that records the call when the stream reaches
/// its terminal: clean end, error, or drop without either.
#[derive(Debug)]
pub struct TimedStream<St> {
    inner: Pin<Box<St>>,
    timer: Option<CallTimer>,
}

impl<St> TimedStream<St> {
    fn new(inner: St, timer: CallTimer) -> Self {
        Self {
            inner: Box::pin(inner),
            timer: Some(timer),
        }
    }
}

impl<T, St> Stream for TimedStream<St>
where
    St: Stream<Item = Result<T, Status>>,
{
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(timer) = this.timer.take() {
                    timer.finish(Ok(()));
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(status))) => {
                if let Some(timer) = this.timer.take() {
                    timer.finish(Err(status.code()));
                }
                Poll::Ready(Some(Err(status)))
            }
            other => other,
        }
    }
}

impl<St> Drop for TimedStream<St> {
    fn drop(&mut self) {
        // Dropped before a terminal frame: the caller went away.
        if let Some(timer) = self.timer.take() {
            timer.finish(Err(Code::Cancelled));
        }
    }
}

/// Decorator implementing the service trait around any inner
/// implementation. Payloads, ordering, and errors pass through untouched.
#[derive(Debug)]
pub struct Instrumented<S> {
    inner: S,
    recorder: Arc<CallRecorder>,
}

impl<S> Instrumented<S> {
    /// Wrap `inner`, reporting into `recorder`.
    pub fn new(inner: S, recorder: Arc<CallRecorder>) -> Self {
        Self { inner, recorder }
    }
}

fn outcome_of<T>(res: &Result<T, Status>) -> Result<(), Code> {
    match res {
        Ok(_) => Ok(()),
        Err(status) => Err(status.code()),
    }
}

#[tonic::async_trait]
impl<S: ImageProcessor> ImageProcessor for Instrumented<S> {
    async fn get_version(
        &self,
        request: Request<GetVersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        let timer = CallTimer::start(self.recorder.clone(), "GetVersion");
        let res = self.inner.get_version(request).await;
        timer.finish(outcome_of(&res));
        res
    }

    async fn upload(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let timer = CallTimer::start(self.recorder.clone(), "Upload");
        let res = self.inner.upload(request).await;
        timer.finish(outcome_of(&res));
        res
    }

    type ProcessStream = TimedStream<S::ProcessStream>;

    async fn process(
        &self,
        request: Request<ProcessRequest>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let timer = CallTimer::start(self.recorder.clone(), "Process");
        match self.inner.process(request).await {
            Ok(response) => Ok(response.map(|stream| TimedStream::new(stream, timer))),
            Err(status) => {
                let code = status.code();
                timer.finish(Err(code));
                Err(status)
            }
        }
    }

    type TuneStream = TimedStream<S::TuneStream>;

    async fn tune(
        &self,
        request: Request<Streaming<TuneRequest>>,
    ) -> Result<Response<Self::TuneStream>, Status> {
        let timer = CallTimer::start(self.recorder.clone(), "Tune");
        match self.inner.tune(request).await {
            Ok(response) => Ok(response.map(|stream| TimedStream::new(stream, timer))),
            Err(status) => {
                let code = status.code();
                timer.finish(Err(code));
                Err(status)
            }
        }
    }
}
