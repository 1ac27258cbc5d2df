use chrono::{Local, NaiveDateTime};
use rollcall_core::{Annotation, Frame, Identity, Matcher, Recognizer};
use rollcall_ledger::{Attendance, LedgerError, LedgerStore, MarkOutcome};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("attendance ledger unusable: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub sequence: u64,
    /// Draw instructions, one per detected face.
    pub annotations: Vec<Annotation>,
    /// Ledger effect of every matched face, in face order.
    pub marked: Vec<(Identity, MarkOutcome)>,
}

/// Messages sent from the frame reader to the engine thread.
enum EngineRequest {
    Process {
        frame: Frame,
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Match every face in `frame` and record the sightings.
    pub async fn process(&self, frame: Frame) -> Result<FrameReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Process {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread is the single writer of the ledger: frames are handled one
/// at a time, in arrival order. It exits once every handle is dropped, or
/// after reporting a corrupt ledger.
pub fn spawn_engine<M, S>(
    recognizer: Recognizer<M>,
    mut attendance: Attendance<S>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError>
where
    M: Matcher + Send + 'static,
    S: LedgerStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(gallery = recognizer.gallery().len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Process { frame, reply } => {
                        let result = run_frame(&recognizer, &mut attendance, frame);
                        let fatal = result.is_err();
                        let _ = reply.send(result);
                        if fatal {
                            break;
                        }
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// Recognize the faces of one frame and mark each matched identity.
///
/// A corrupt ledger is fatal. Other ledger failures are logged and leave
/// the frame's annotations intact.
fn run_frame<M: Matcher, S: LedgerStore>(
    recognizer: &Recognizer<M>,
    attendance: &mut Attendance<S>,
    frame: Frame,
) -> Result<FrameReport, EngineError> {
    let at: NaiveDateTime = frame
        .captured_at
        .unwrap_or_else(|| Local::now().naive_local());
    let recognition = recognizer.recognize(&frame);

    tracing::debug!(
        sequence = frame.sequence,
        faces = frame.faces.len(),
        matched = recognition.sightings.len(),
        "frame recognized"
    );

    let mut marked = Vec::with_capacity(recognition.sightings.len());
    for identity in recognition.sightings {
        match attendance.mark(&identity, at) {
            Ok(outcome) => marked.push((identity, outcome)),
            Err(e @ LedgerError::Corrupt { .. }) => {
                tracing::error!(%identity, error = %e, "attendance ledger is corrupt");
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(%identity, error = %e, "failed to record attendance");
            }
        }
    }

    Ok(FrameReport {
        sequence: frame.sequence,
        annotations: recognition.annotations,
        marked,
    })
}
