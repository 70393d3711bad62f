//! Glance Core Library
//!
//! Drag a rectangle over anything on screen, capture exactly that region and
//! ask a vision model about it, with the answer streamed back as it is
//! written.
//!
//! # Overview
//!
//! - **Geometry**: mapping a drag in overlay space onto display pixels via
//!   [`geometry`]
//! - **Screen Capture**: one frame from a streaming capture session via
//!   [`capture`]
//! - **Selection**: the drag/release/capture lifecycle in [`selection`]
//! - **Image Processing**: cropping and JPEG encoding via [`image_processing`]
//! - **Analysis**: streamed answers from OpenAI-compatible or Gemini
//!   endpoints via [`analysis`]
//! - **User Interface**: the transparent selection overlay in [`ui`]
//!
//! # Quick Start
//!
//! ```ignore
//! use glance_core::Glance;
//!
//! glance_core::init();
//! let app = Glance::new()?;
//!
//! for display in app.list_displays()? {
//!     println!("{}", display);
//! }
//!
//! app.run_interactive()?;
//! ```

pub mod analysis;
pub mod capture;
pub mod completion;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image_processing;
pub mod selection;
pub mod ui;

// Re-export primary types for convenience
pub use analysis::StreamingQueryClient;
pub use capture::{CaptureBackend, DisplayInfo, FrameCaptureBridge, ScreenBackend};
pub use config::{Config, Provider};
pub use error::{AnalysisError, AppError, CaptureError, Result};
pub use geometry::{Point, Rect};
pub use image_processing::{EncodedImage, ImageProcessor};

use geometry::AxisOrientation;
use image::RgbaImage;
use selection::{HeadlessHost, SelectionCompletion, SelectionSession};
use std::sync::Arc;

/// Main entry point: owns the capture bridge and the query client.
pub struct Glance {
    config: Config,
    bridge: Arc<FrameCaptureBridge>,
    client: Arc<StreamingQueryClient>,
}

impl Glance {
    /// Loads configuration from the environment (including `.env`) and uses
    /// the local screen.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::load()?)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(ScreenBackend::new()))
    }

    /// Uses `backend` for capture and the configured provider for analysis.
    pub fn with_backend(config: Config, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        let client = StreamingQueryClient::from_config(&config)?;
        Ok(Self::from_parts(config, backend, client))
    }

    pub fn from_parts(
        config: Config,
        backend: Arc<dyn CaptureBackend>,
        client: StreamingQueryClient,
    ) -> Self {
        let bridge = FrameCaptureBridge::new(backend)
            .with_max_frame_rate(config.max_frame_rate)
            .with_frame_timeout(config.frame_timeout);
        Self {
            config,
            bridge: Arc::new(bridge),
            client: Arc::new(client),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn list_displays(&self) -> Result<Vec<DisplayInfo>> {
        Ok(self.bridge.displays()?)
    }

    /// Opens the selection overlay and blocks until it is closed.
    pub fn run_interactive(&self) -> Result<()> {
        ui::run_with(self.config.clone(), self.bridge.clone(), self.client.clone())
    }

    /// Captures `region` of display `display_id` without any UI.
    ///
    /// `region` is in the display's own points, origin top-left. Runs the
    /// same selection lifecycle as the overlay, with the display standing in
    /// for the overlay window.
    ///
    /// Returns `Ok(None)` when the region holds no pixels.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoMatchingDisplay`] for an unknown display.
    pub async fn capture_region(&self, display_id: u32, region: Rect) -> Result<Option<RgbaImage>> {
        let display = self
            .bridge
            .displays()?
            .into_iter()
            .find(|d| d.id == display_id)
            .ok_or(CaptureError::NoMatchingDisplay(display_id))?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let completion: SelectionCompletion = Box::new(move |image| {
            let _ = tx.send(image);
        });

        let mut host = HeadlessHost::new(display.frame);
        let mut session = SelectionSession::new(completion);
        session.mouse_down(region.origin());
        session.mouse_dragged(Point::new(region.max_x(), region.max_y()));
        session
            .release_and_capture(
                &mut host,
                &self.bridge,
                self.config.settle_delay,
                AxisOrientation::TopDown,
            )
            .await;

        Ok(rx.await.unwrap_or(None))
    }

    /// Streams an answer to `query` about `image` into `on_chunk`.
    pub async fn analyze<F>(&self, image: &RgbaImage, query: &str, on_chunk: F) -> Result<()>
    where
        F: FnMut(&str),
    {
        Ok(self.client.analyze_image(image, query, on_chunk).await?)
    }
}

/// Loads `.env` and installs the logger.
///
/// Logging defaults to `info` and follows `RUST_LOG` when set. Safe to call
/// more than once.
///
/// # Example
///
/// ```ignore
/// glance_core::init();
/// let config = glance_core::Config::load()?;
/// ```
pub fn init() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
