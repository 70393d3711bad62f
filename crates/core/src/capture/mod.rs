//! Screen capture.
//!
//! Capture is modelled the way compositors expose it: a *session* is opened
//! on one display and pushes frames to a handler until it is stopped. The
//! [`FrameCaptureBridge`] narrows that down to "give me the next frame".
//!
//! # Example
//!
//! ```ignore
//! use glance_core::capture::{FrameCaptureBridge, ScreenBackend};
//! use std::sync::Arc;
//!
//! let bridge = FrameCaptureBridge::new(Arc::new(ScreenBackend::new()));
//! let display = bridge.displays()?.remove(0);
//! let frame = bridge.capture_one_frame(display.id, display.pixel_size()).await?;
//! ```

pub mod bridge;
pub mod screen;

pub use bridge::FrameCaptureBridge;
pub use screen::ScreenBackend;

use crate::error::CaptureError;
use crate::geometry::Rect;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel dimensions of a display or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A capturable display as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub id: u32,
    /// Position and size in global desktop points.
    pub frame: Rect,
    /// Physical pixels per point.
    pub scale_factor: f32,
    pub is_primary: bool,
}

impl DisplayInfo {
    /// Native resolution of the display in pixels.
    pub fn pixel_size(&self) -> PixelSize {
        let scale = f64::from(self.scale_factor.max(f32::EPSILON));
        PixelSize::new(
            (self.frame.width * scale).round() as u32,
            (self.frame.height * scale).round() as u32,
        )
    }
}

impl fmt::Display for DisplayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Display {}: {}x{} at ({}, {}) (scale: {}){}",
            self.id,
            self.frame.width,
            self.frame.height,
            self.frame.x,
            self.frame.y,
            self.scale_factor,
            if self.is_primary { " [primary]" } else { "" }
        )
    }
}

/// Picks the display an overlay window lives on.
///
/// The display containing the window's center wins; otherwise the one sharing
/// the largest area with it.
pub fn display_for_window(displays: &[DisplayInfo], window_frame: Rect) -> Option<&DisplayInfo> {
    let center = window_frame.center();
    displays
        .iter()
        .find(|d| d.frame.contains(center))
        .or_else(|| {
            displays
                .iter()
                .filter_map(|d| {
                    d.frame
                        .intersection(&window_frame)
                        .map(|overlap| (d, overlap.width * overlap.height))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(d, _)| d)
        })
}

/// One still RGBA8 frame.
///
/// Rows may be padded: `stride` is the byte distance between row starts and
/// is at least `width * 4`.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl CapturedFrame {
    /// A tightly packed frame.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::with_stride(width, height, width as usize * BYTES_PER_PIXEL, data)
    }

    pub fn with_stride(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True when the buffer holds every row the dimensions promise.
    pub fn is_well_formed(&self) -> bool {
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if self.width == 0 || self.height == 0 || self.stride < row_bytes {
            return false;
        }
        let needed = self.stride * (self.height as usize - 1) + row_bytes;
        self.data.len() >= needed
    }

    /// The pixels of row `y`, without padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data
            .get(start..start + self.width as usize * BYTES_PER_PIXEL)
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Lifecycle of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Capturing,
    Stopping,
    Stopped,
}

/// Parameters for opening a capture session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub display: DisplayInfo,
    pub pixel_size: PixelSize,
    /// Upper bound only; the bridge consumes a single frame.
    pub max_frame_rate: u32,
    pub queue_depth: u32,
}

impl StreamConfig {
    /// Minimum spacing between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.max_frame_rate.max(1)
    }
}

/// Receives what a capture session produces.
///
/// Sessions may call these from any thread, any number of times.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: CapturedFrame);
    fn on_error(&self, error: String);
}

/// A running (or runnable) capture session.
pub trait CaptureStream: Send {
    fn start(&mut self) -> BoxFuture<'_, Result<(), String>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), String>>;
    fn state(&self) -> SessionState;
}

/// Display enumeration plus session construction.
pub trait CaptureBackend: Send + Sync {
    /// The current list of capturable displays.
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    /// Opens a session on `config.display`. Nothing is delivered before
    /// [`CaptureStream::start`].
    fn open_stream(
        &self,
        config: StreamConfig,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(id: u32, x: f64, y: f64) -> DisplayInfo {
        DisplayInfo {
            id,
            frame: Rect::new(x, y, 1920.0, 1080.0),
            scale_factor: 1.0,
            is_primary: id == 1,
        }
    }

    #[test]
    fn window_resolves_to_display_under_its_center() {
        let displays = [display(1, 0.0, 0.0), display(2, 1920.0, 0.0)];
        let window = Rect::new(1920.0, 0.0, 1920.0, 1080.0);
        assert_eq!(display_for_window(&displays, window).map(|d| d.id), Some(2));
    }

    #[test]
    fn window_straddling_falls_back_to_largest_overlap() {
        let displays = [display(1, 0.0, 0.0), display(2, 1920.0, 0.0)];
        // Center lies below both displays; most of the window is on display 1.
        let window = Rect::new(1000.0, 900.0, 1000.0, 1000.0);
        assert_eq!(display_for_window(&displays, window).map(|d| d.id), Some(1));
        assert!(display_for_window(&displays, Rect::new(0.0, 5000.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn pixel_size_applies_scale() {
        let mut d = display(1, 0.0, 0.0);
        d.scale_factor = 2.0;
        assert_eq!(d.pixel_size(), PixelSize::new(3840, 2160));
    }

    #[test]
    fn padded_rows_are_addressed_by_stride() {
        // 2x2 frame, 4 bytes of padding per row
        let data: Vec<u8> = (0..24).collect();
        let frame = CapturedFrame::with_stride(2, 2, 12, data);
        assert!(frame.is_well_formed());
        assert_eq!(frame.row(1), Some(&[12, 13, 14, 15, 16, 17, 18, 19][..]));
        assert_eq!(frame.row(2), None);
    }

    #[test]
    fn short_buffers_are_malformed() {
        assert!(!CapturedFrame::from_rgba(2, 2, vec![0; 15]).is_well_formed());
        assert!(!CapturedFrame::from_rgba(0, 2, Vec::new()).is_well_formed());
    }
}
