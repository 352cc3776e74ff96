use facewatch_core::{AnalysisResponse, AnalyzeError, FaceDetector, RecognitionService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Queued requests per engine thread before senders wait.
const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("no detector available to start the engine")]
    NoDetector,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to an engine thread.
enum EngineRequest {
    Analyze {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<AnalysisResponse, AnalyzeError>>,
    },
}

/// Clone-safe handle to the engine threads. Requests are spread round-robin.
#[derive(Clone)]
pub struct EngineHandle {
    workers: Arc<Vec<mpsc::Sender<EngineRequest>>>,
    next: Arc<AtomicUsize>,
}

impl EngineHandle {
    /// Decode, detect and match one encoded image.
    pub async fn analyze(&self, image: Vec<u8>) -> Result<AnalysisResponse, EngineError> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.workers[slot]
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

/// Spawn one engine thread per detector.
///
/// Each thread owns its detector; all of them read the same `service`.
pub fn spawn_engine(
    detectors: Vec<Box<dyn FaceDetector>>,
    service: Arc<RecognitionService>,
) -> Result<EngineHandle, EngineError> {
    if detectors.is_empty() {
        return Err(EngineError::NoDetector);
    }

    let mut workers = Vec::with_capacity(detectors.len());

    for (index, mut detector) in detectors.into_iter().enumerate() {
        let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);
        let service = Arc::clone(&service);

        std::thread::Builder::new()
            .name(format!("facewatch-engine-{index}"))
            .spawn(move || {
                tracing::info!(worker = index, detector = detector.name(), "engine thread started");
                while let Some(req) = rx.blocking_recv() {
                    match req {
                        EngineRequest::Analyze { image, reply } => {
                            let result = facewatch_core::analyze(&image, detector.as_mut(), &service);
                            let _ = reply.send(result);
                        }
                    }
                }
                tracing::info!(worker = index, "engine thread exiting");
            })
            .map_err(EngineError::Spawn)?;

        workers.push(tx);
    }

    Ok(EngineHandle {
        workers: Arc::new(workers),
        next: Arc::new(AtomicUsize::new(0)),
    })
}
