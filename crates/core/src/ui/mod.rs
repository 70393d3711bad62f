//! Interactive selection overlay.
//!
//! # Architecture
//!
//! The UI is split into focused submodules:
//! - [`state`]: overlay states, the review panel model and background events
//! - [`rendering`]: backdrop, outline and popup placement
//! - [`selection`]: pointer input for the drag
//! - [`overlay`]: the `eframe` application and its [`OverlayHost`]
//!
//! [`OverlayHost`]: crate::selection::OverlayHost
//!
//! # Usage
//!
//! ```ignore
//! use glance_core::{Config, Glance};
//!
//! let app = Glance::with_config(Config::load()?)?;
//! app.run_interactive()?;
//! ```

mod overlay;
mod rendering;
mod selection;
mod state;

pub use overlay::{EguiHost, OverlayApp};
pub use state::{Answer, DEFAULT_QUERY, Review, UiState};

use crate::analysis::StreamingQueryClient;
use crate::capture::FrameCaptureBridge;
use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;

/// Opens the overlay with the given capture and analysis services and
/// returns once it is closed.
///
/// # Errors
///
/// Returns an error if no display can be enumerated or the window cannot be
/// created.
pub fn run_with(
    config: Config,
    bridge: Arc<FrameCaptureBridge>,
    client: Arc<StreamingQueryClient>,
) -> Result<()> {
    overlay::run(config, bridge, client)
}
