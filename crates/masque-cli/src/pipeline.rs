//! Live capture pipeline: camera → faces → filters → rendered frames.
//!
//! Capture and rendering run on one dedicated OS thread; the async side
//! consumes rendered frames from a bounded channel and controls the thread
//! through a stop flag and the shared filter toggles.

use image::RgbImage;
use masque_core::{FilterRenderer, FilterToggles, LandmarkSource};
use masque_hw::{Camera, CameraError, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("failed to spawn pipeline thread: {0}")]
    Spawn(std::io::Error),
    #[error("pipeline thread panicked: {0}")]
    Panicked(String),
}

/// A frame with every enabled filter drawn on it.
pub struct RenderedFrame {
    pub image: RgbImage,
    pub sequence: u32,
    /// Sprites composited onto this frame.
    pub sprites: usize,
}

/// Counters reported when the pipeline thread exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub sprites: u64,
    pub feed_errors: u64,
}

/// Camera and timing settings for [`spawn_pipeline`].
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: usize,
    pub queue: usize,
}

/// Handle to the running pipeline thread.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Result<PipelineStats, PipelineError>>,
}

impl PipelineHandle {
    /// Ask the thread to finish after the frame it is working on.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for the thread to exit. Blocks; call from a blocking context.
    pub fn join(self) -> Result<PipelineStats, PipelineError> {
        self.stop();
        self.thread.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%message, "pipeline thread panicked");
            PipelineError::Panicked(message)
        })?
    }
}

/// Open the camera and start the capture thread.
///
/// The camera is opened before the thread starts so a missing or busy
/// device fails here rather than on the first frame.
pub fn spawn_pipeline<S>(
    settings: CaptureSettings,
    renderer: FilterRenderer,
    mut source: S,
    toggles: Arc<FilterToggles>,
) -> Result<(PipelineHandle, mpsc::Receiver<RenderedFrame>), PipelineError>
where
    S: LandmarkSource + Send + 'static,
{
    let camera = Camera::open(&settings.device, settings.width, settings.height)?;
    tracing::info!(
        device = %settings.device,
        width = camera.width,
        height = camera.height,
        format = ?camera.pixel_format(),
        "camera opened"
    );

    let (tx, rx) = mpsc::channel::<RenderedFrame>(settings.queue);
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let warmup_frames = settings.warmup_frames;

    let thread = std::thread::Builder::new()
        .name("masque-pipeline".into())
        .spawn(move || {
            tracing::info!("pipeline thread started");
            let mut stream = camera.stream()?;

            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                for _ in 0..warmup_frames {
                    let _ = stream.next_frame();
                }
            }

            let result = render_loop(
                || stream.next_frame(),
                &mut source,
                &renderer,
                &toggles,
                &thread_stop,
                &tx,
            );
            match &result {
                Ok(stats) => tracing::info!(?stats, "pipeline thread exiting"),
                Err(e) => tracing::error!(error = %e, "pipeline thread stopped"),
            }
            result
        })
        .map_err(PipelineError::Spawn)?;

    Ok((PipelineHandle { stop, thread }, rx))
}

/// Pull frames until stopped, the landmark feed ends, the consumer goes
/// away, or the camera fails. Only a camera failure is an error.
fn render_loop<F, S>(
    mut next_frame: F,
    source: &mut S,
    renderer: &FilterRenderer,
    toggles: &FilterToggles,
    stop: &AtomicBool,
    tx: &mpsc::Sender<RenderedFrame>,
) -> Result<PipelineStats, PipelineError>
where
    F: FnMut() -> Result<Frame, CameraError>,
    S: LandmarkSource,
{
    let mut stats = PipelineStats::default();

    while !stop.load(Ordering::Acquire) {
        let mut frame = next_frame()?;

        let faces = match source.next_faces() {
            Ok(Some(faces)) => faces,
            Ok(None) => {
                tracing::info!("landmark feed ended");
                break;
            }
            Err(e) => {
                stats.feed_errors += 1;
                tracing::warn!(error = %e, seq = frame.sequence, "bad landmark record; frame passes through");
                Vec::new()
            }
        };

        let filters = toggles.snapshot();
        let sprites = renderer.render_frame(&mut frame.image, &faces, filters);
        tracing::trace!(seq = frame.sequence, faces = faces.len(), sprites, %filters, "frame rendered");

        stats.frames += 1;
        stats.sprites += sprites as u64;

        let rendered = RenderedFrame {
            image: frame.image,
            sequence: frame.sequence,
            sprites,
        };
        if tx.blocking_send(rendered).is_err() {
            tracing::debug!("frame consumer closed");
            break;
        }
    }

    Ok(stats)
}
