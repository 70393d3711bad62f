//! Capture backend built on the `screenshots` crate.
//!
//! Supports X11 and Wayland on Linux, as well as Windows and macOS. The crate
//! only offers one-shot grabs, so [`ScreenStream`] turns them into a session:
//! a worker thread grabs the display at the configured frame rate and pushes
//! every frame to the handler until the session is stopped.

use super::{
    CaptureBackend, CaptureStream, CapturedFrame, DisplayInfo, FrameHandler, SessionState,
    StreamConfig,
};
use crate::error::CaptureError;
use crate::geometry::Rect;
use futures::FutureExt;
use futures::future::BoxFuture;
use screenshots::Screen;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Screen capture backend for the local desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenBackend;

impl ScreenBackend {
    pub fn new() -> Self {
        Self
    }

    fn screens() -> Result<Vec<Screen>, CaptureError> {
        Screen::all()
            .map_err(|e| CaptureError::start(format!("Failed to enumerate screens: {}", e)))
    }
}

fn display_info(screen: &Screen) -> DisplayInfo {
    let info = &screen.display_info;
    DisplayInfo {
        id: info.id,
        frame: Rect::new(
            f64::from(info.x),
            f64::from(info.y),
            f64::from(info.width),
            f64::from(info.height),
        ),
        scale_factor: info.scale_factor,
        is_primary: info.is_primary,
    }
}

impl CaptureBackend for ScreenBackend {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let screens = Self::screens()?;
        if screens.is_empty() {
            return Err(CaptureError::start("No screens detected"));
        }
        Ok(screens.iter().map(display_info).collect())
    }

    fn open_stream(
        &self,
        config: StreamConfig,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let screen = Self::screens()?
            .into_iter()
            .find(|s| s.display_info.id == config.display.id)
            .ok_or(CaptureError::NoMatchingDisplay(config.display.id))?;

        Ok(Box::new(ScreenStream {
            screen,
            config,
            handler,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            state: SessionState::Idle,
        }))
    }
}

/// A polling capture session on one screen.
pub struct ScreenStream {
    screen: Screen,
    config: StreamConfig,
    handler: Arc<dyn FrameHandler>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    state: SessionState,
}

impl ScreenStream {
    fn spawn_worker(&self) -> std::io::Result<JoinHandle<()>> {
        let screen = self.screen.clone();
        let handler = self.handler.clone();
        let running = self.running.clone();
        let interval = self.config.frame_interval();

        thread::Builder::new()
            .name(format!("capture-display-{}", screen.display_info.id))
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    match screen.capture() {
                        Ok(captured) => {
                            // Convert screenshots::Image into our frame without
                            // depending on its image crate version.
                            let width = captured.width();
                            let height = captured.height();
                            handler.on_frame(CapturedFrame::from_rgba(
                                width,
                                height,
                                captured.into_raw(),
                            ));
                        }
                        Err(e) => {
                            handler.on_error(format!("Failed to capture screen: {}", e));
                            break;
                        }
                    }
                    thread::sleep(interval);
                }
            })
    }
}

impl CaptureStream for ScreenStream {
    fn start(&mut self) -> BoxFuture<'_, Result<(), String>> {
        async move {
            if self.worker.is_some() {
                return Err("session already started".to_string());
            }
            self.state = SessionState::Starting;
            self.running.store(true, Ordering::Release);
            match self.spawn_worker() {
                Ok(worker) => {
                    self.worker = Some(worker);
                    self.state = SessionState::Capturing;
                    Ok(())
                }
                Err(e) => {
                    self.running.store(false, Ordering::Release);
                    self.state = SessionState::Stopped;
                    Err(format!("Failed to spawn capture worker: {}", e))
                }
            }
        }
        .boxed()
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), String>> {
        async move {
            self.state = SessionState::Stopping;
            self.running.store(false, Ordering::Release);
            let result = match self.worker.take() {
                // The worker may be inside a grab; wait for it off the async
                // threads.
                Some(worker) => tokio::task::spawn_blocking(move || worker.join())
                    .await
                    .map_err(|e| format!("Failed to join capture worker: {}", e))
                    .and_then(|joined| joined.map_err(|_| "Capture worker panicked".to_string())),
                None => Ok(()),
            };
            self.state = SessionState::Stopped;
            result
        }
        .boxed()
    }

    fn state(&self) -> SessionState {
        self.state
    }
}
