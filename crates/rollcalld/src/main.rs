use anyhow::{Context, Result};
use rollcall_core::pipeline::{JsonLinesSink, JsonLinesSource, PipelineError};
use rollcall_core::{
    Config, EmbeddingFileEncoder, EuclideanMatcher, Frame, FrameSink, FrameSource, Gallery,
    Recognizer,
};
use rollcall_ledger::{Attendance, CsvLedgerStore, LedgerStore};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load(None).context("loading configuration")?;

    // Startup faults stop the daemon before any frame is read.
    let gallery = Gallery::from_dir(&config.gallery_dir, &mut EmbeddingFileEncoder)
        .context("building face gallery")?;
    if gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty; every face will be Unknown"
        );
    }

    let store = CsvLedgerStore::new(&config.ledger_path);
    let ledger = store.load().context("checking attendance ledger")?;
    tracing::info!(path = %config.ledger_path.display(), records = ledger.len(), "ledger ready");

    let engine = engine::spawn_engine(
        Recognizer::new(gallery, EuclideanMatcher::new(config.match_threshold)),
        Attendance::new(store),
        config.queue_depth,
    )?;

    let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(config.queue_depth);
    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::Builder::new()
        .name("rollcall-frames".into())
        .spawn(move || read_frames(frames_tx))
        .context("spawning frame reader")?;

    let mut sink = JsonLinesSink::new(std::io::stdout());

    tracing::info!(threshold = config.match_threshold, "rollcalld ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            frame = frames_rx.recv() => {
                let Some(frame) = frame else {
                    tracing::info!("frame stream ended");
                    break;
                };
                let report = engine.process(frame).await.context("recognition engine stopped")?;
                if let Err(e) = sink.emit(report.sequence, &report.annotations) {
                    tracing::error!(error = %e, "annotation sink closed");
                    break;
                }
            }
        }
    }

    tracing::info!("rollcalld shutting down");

    Ok(())
}

/// Pull frames from stdin and forward them to the engine loop.
///
/// Malformed lines are skipped; the loop ends at end of input, on a read
/// error, or once the receiving side has gone away.
fn read_frames(tx: mpsc::Sender<Frame>) {
    let stdin = std::io::stdin();
    let mut source = JsonLinesSource::new(stdin.lock());

    loop {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if tx.blocking_send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e @ PipelineError::Malformed { .. }) => {
                tracing::warn!(error = %e, "skipping malformed frame");
            }
            Err(e) => {
                tracing::error!(error = %e, "frame source failed");
                break;
            }
        }
    }
}
