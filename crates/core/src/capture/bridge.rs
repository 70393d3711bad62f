//! Start a session, take its first frame, stop it.

use super::{
    CaptureBackend, CaptureStream, CapturedFrame, DisplayInfo, FrameHandler, PixelSize,
    SessionState, StreamConfig,
};
use crate::completion::Completion;
use crate::error::CaptureError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default ceiling for the session frame rate.
pub const DEFAULT_MAX_FRAME_RATE: u32 = 60;

/// Default time to wait for the first frame before giving up.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns a continuous frame-producing session into a single still frame.
///
/// Calls are serialized: a second [`capture_one_frame`](Self::capture_one_frame)
/// waits until the first one has stopped its session, so at most one session
/// per bridge is ever running.
pub struct FrameCaptureBridge {
    backend: Arc<dyn CaptureBackend>,
    max_frame_rate: u32,
    frame_timeout: Duration,
    in_flight: Mutex<()>,
}

impl FrameCaptureBridge {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_max_frame_rate(mut self, fps: u32) -> Self {
        self.max_frame_rate = fps.max(1);
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// The backend's live display list.
    pub fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        self.backend.displays()
    }

    /// Captures exactly one frame of display `display_id`.
    ///
    /// The session is stopped before this returns, on every path.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::NoMatchingDisplay`] if the display is gone; no
    ///   session is opened in that case
    /// - [`CaptureError::SessionStartFailed`] if the session cannot be opened
    ///   or started
    /// - [`CaptureError::NoFrameDelivered`] if the session reports an error,
    ///   ends, or times out before the first frame
    pub async fn capture_one_frame(
        &self,
        display_id: u32,
        pixel_size: PixelSize,
    ) -> Result<CapturedFrame, CaptureError> {
        let _serial = self.in_flight.lock().await;
        let started = Instant::now();

        let displays = self
            .backend
            .displays()
            .map_err(|e| CaptureError::start(format!("Failed to enumerate displays: {}", e)))?;
        let display = displays
            .into_iter()
            .find(|d| d.id == display_id)
            .ok_or(CaptureError::NoMatchingDisplay(display_id))?;

        let config = StreamConfig {
            display,
            pixel_size,
            max_frame_rate: self.max_frame_rate,
            queue_depth: 1,
        };
        let (handler, first_frame) = FirstFrameHandler::new();
        let handler = Arc::new(handler);
        let mut stream = self.backend.open_stream(config, handler.clone())?;

        log::debug!(
            "Starting capture session on display {} at {}x{}",
            display_id,
            pixel_size.width,
            pixel_size.height
        );

        if let Err(e) = stream.start().await {
            Self::teardown(stream.as_mut()).await;
            return Err(CaptureError::start(e));
        }

        let outcome = match tokio::time::timeout(self.frame_timeout, first_frame).await {
            Ok(Ok(Ok(frame))) => Ok(frame),
            Ok(Ok(Err(reason))) => Err(CaptureError::no_frame(reason)),
            Ok(Err(_)) => Err(CaptureError::no_frame("session ended without a frame")),
            Err(_) => Err(CaptureError::no_frame(format!(
                "timed out after {}ms",
                self.frame_timeout.as_millis()
            ))),
        };

        Self::teardown(stream.as_mut()).await;

        match &outcome {
            Ok(frame) => log::info!(
                "Captured {}x{} frame of display {} in {}ms ({} late frames dropped)",
                frame.width(),
                frame.height(),
                display_id,
                started.elapsed().as_millis(),
                handler.dropped()
            ),
            Err(e) => log::error!("Capture of display {} failed: {}", display_id, e),
        }
        outcome
    }

    /// Best-effort stop; failures are logged, never returned.
    ///
    /// Sessions that never left `Idle` or already stopped are left alone.
    async fn teardown(stream: &mut dyn CaptureStream) {
        let state = stream.state();
        if matches!(state, SessionState::Idle | SessionState::Stopped) {
            log::debug!("Capture session already {:?}, nothing to stop", state);
            return;
        }
        if let Err(e) = stream.stop().await {
            log::warn!("Failed to stop capture session: {}", e);
        }
    }
}

/// Resolves on the first frame or error; everything afterwards is counted and
/// dropped.
struct FirstFrameHandler {
    completion: Completion<Result<CapturedFrame, String>>,
    dropped: AtomicUsize,
}

impl FirstFrameHandler {
    fn new() -> (
        Self,
        tokio::sync::oneshot::Receiver<Result<CapturedFrame, String>>,
    ) {
        let (completion, rx) = Completion::new();
        let handler = Self {
            completion,
            dropped: AtomicUsize::new(0),
        };
        (handler, rx)
    }

    fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameHandler for FirstFrameHandler {
    fn on_frame(&self, frame: CapturedFrame) {
        if !self.completion.resolve(Ok(frame)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_error(&self, error: String) {
        if !self.completion.resolve(Err(error.clone())) {
            log::debug!("Ignoring capture error after first frame: {}", error);
        }
    }
}
