//! Overlay render task
//!
//! The render loop is an explicit task owned by the compositor. Whoever holds
//! the [`RenderHandle`] decides when it ends; once `stop` returns no further
//! frame is drawn or published.

use image::RgbaImage;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::layout::OverlayLayout;
use super::render::draw_frame;
use crate::media::{MediaTrack, VideoFrame, VideoTrackWriter};

/// Inputs for one render loop
pub(crate) struct RenderJob {
    pub canvas: RgbaImage,
    pub screen: MediaTrack,
    pub webcam: MediaTrack,
    pub layout: watch::Receiver<OverlayLayout>,
    pub output: VideoTrackWriter,
    pub frame_rate: u32,
}

/// Handle to a running overlay render loop
#[derive(Debug)]
pub struct RenderHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl RenderHandle {
    pub(crate) fn spawn(job: RenderJob) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(job, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the next scheduled frame and wait for the loop to exit.
    ///
    /// Idempotent. Returns the number of frames drawn.
    pub async fn stop(&mut self) -> u64 {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::error!("Render task panicked: {}", e);
                    0
                }
            },
            None => 0,
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(job: RenderJob, cancel: CancellationToken) -> u64 {
    let RenderJob {
        mut canvas,
        screen,
        webcam,
        layout,
        output,
        frame_rate,
    } = job;

    let (width, height) = canvas.dimensions();
    let mut ticker = interval(Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut frames = 0u64;
    let mut webcam_dropped = false;

    info!(
        "Overlay render loop started: {}x{} canvas at {} fps",
        width, height, frame_rate
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !output.is_live() {
            debug!("Composed video track ended, leaving render loop");
            break;
        }

        let screen_frame = screen.latest_frame();
        let webcam_frame = if webcam.is_live() {
            webcam.latest_frame()
        } else {
            if !webcam_dropped {
                info!("Webcam track ended, continuing with screen only");
                webcam_dropped = true;
            }
            None
        };

        let rect = layout.borrow().rect(width, height);
        draw_frame(
            &mut canvas,
            screen_frame.as_ref().map(|f| f.image()),
            webcam_frame.as_ref().map(|f| f.image()),
            rect,
        );

        // A cancel that raced the draw must not publish into a torn-down stream
        if cancel.is_cancelled() {
            break;
        }
        let timestamp_ms = started.elapsed().as_millis() as u64;
        // The canvas is reused for the next draw, so publish a copy
        if !output.push(VideoFrame::new(canvas.clone(), timestamp_ms)) {
            break;
        }
        frames += 1;
    }

    debug!("Overlay render loop exited after {} frames", frames);
    frames
}
