//! Drag-to-capture selection lifecycle.
//!
//! A [`SelectionSession`] follows
//! `Idle → Dragging → Releasing → Capturing → Completed`. There is no retry
//! state: a failed capture completes the session without an image.
//!
//! The session never samples the screen itself. On release it hides the
//! overlay through [`OverlayHost`] and hands out a [`PendingCapture`], which a
//! host may run on a background task; the result comes back through
//! [`SelectionSession::complete`] on the UI side. Hosts that can simply await
//! use [`SelectionSession::release_and_capture`].

use crate::capture::{FrameCaptureBridge, display_for_window};
use crate::error::CaptureError;
use crate::geometry::{AxisOrientation, Point, Rect, selection_to_display};
use crate::image_processing::ImageProcessor;
use image::RgbaImage;
use std::fmt;
use std::time::Duration;

/// Time given to the compositor to repaint the hidden overlay before the
/// screen is sampled.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Called once per session with the cropped image, or `None`.
pub type SelectionCompletion = Box<dyn FnOnce(Option<RgbaImage>) + Send>;

/// The overlay a selection is drawn on.
///
/// Implemented by the UI host; called only from the UI-owning context.
pub trait OverlayHost {
    /// Shows or hides the selection outline.
    fn set_selection_visible(&mut self, visible: bool);

    /// Shows or hides the dimmed backdrop. Hidden means fully transparent.
    fn set_backdrop_visible(&mut self, visible: bool);

    /// The overlay window's content area in global desktop points.
    fn window_frame(&self) -> Rect;
}

/// An [`OverlayHost`] with nothing to draw, covering a fixed frame.
///
/// Used to drive a session from code, e.g. a region given on the command
/// line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessHost {
    frame: Rect,
}

impl HeadlessHost {
    pub fn new(frame: Rect) -> Self {
        Self { frame }
    }
}

impl OverlayHost for HeadlessHost {
    fn set_selection_visible(&mut self, _visible: bool) {}

    fn set_backdrop_visible(&mut self, _visible: bool) {}

    fn window_frame(&self) -> Rect {
        self.frame
    }
}

/// Phases of a selection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    Dragging,
    Releasing,
    Capturing,
    Completed,
}

/// One drag-to-capture lifecycle.
pub struct SelectionSession {
    state: SelectionState,
    origin: Point,
    rect: Rect,
    completion: Option<SelectionCompletion>,
}

impl SelectionSession {
    pub fn new(completion: SelectionCompletion) -> Self {
        Self {
            state: SelectionState::Idle,
            origin: Point::default(),
            rect: Rect::default(),
            completion: Some(completion),
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// The current selection in drag-local coordinates.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Starts a drag at `p`.
    pub fn mouse_down(&mut self, p: Point) {
        if self.state != SelectionState::Idle {
            log::debug!("Ignoring mouse down in state {:?}", self.state);
            return;
        }
        self.origin = p;
        self.rect = Rect::at(p);
        self.state = SelectionState::Dragging;
    }

    /// Extends the drag to `p` and returns the rectangle to draw.
    pub fn mouse_dragged(&mut self, p: Point) -> Option<Rect> {
        if self.state != SelectionState::Dragging {
            return None;
        }
        self.rect = Rect::from_corners(self.origin, p);
        Some(self.rect)
    }

    /// Ends the drag.
    ///
    /// Freezes the rectangle and hides the outline and backdrop *before*
    /// returning, so nothing of the overlay can end up in the frame.
    pub fn mouse_up(&mut self, host: &mut dyn OverlayHost) -> Option<PendingCapture> {
        if self.state != SelectionState::Dragging {
            return None;
        }
        host.set_selection_visible(false);
        host.set_backdrop_visible(false);
        self.state = SelectionState::Releasing;

        log::debug!("Selection released at {:?}", self.rect);
        Some(PendingCapture {
            selection: self.rect,
            window_frame: host.window_frame(),
        })
    }

    /// Marks the settle delay as elapsed and the capture as running.
    pub fn begin_capture(&mut self) {
        if self.state == SelectionState::Releasing {
            self.state = SelectionState::Capturing;
        }
    }

    /// Finishes the session: restores the overlay and fires the completion.
    ///
    /// Only the first call has any effect.
    pub fn complete(&mut self, image: Option<RgbaImage>, host: &mut dyn OverlayHost) {
        let Some(completion) = self.completion.take() else {
            return;
        };
        host.set_selection_visible(true);
        host.set_backdrop_visible(true);
        self.state = SelectionState::Completed;
        completion(image);
    }

    /// Ends the session without an image.
    pub fn cancel(&mut self, host: &mut dyn OverlayHost) {
        self.complete(None, host);
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_none()
    }

    /// Runs the release path on the current task: hide, settle, capture,
    /// crop, restore, complete.
    ///
    /// Returns `false` if the session was not dragging.
    pub async fn release_and_capture(
        &mut self,
        host: &mut dyn OverlayHost,
        bridge: &FrameCaptureBridge,
        settle_delay: Duration,
        orientation: AxisOrientation,
    ) -> bool {
        let Some(pending) = self.mouse_up(host) else {
            return false;
        };
        tokio::time::sleep(settle_delay).await;
        self.begin_capture();
        let image = pending.capture(bridge, orientation).await;
        self.complete(image, host);
        true
    }
}

impl fmt::Debug for SelectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionSession")
            .field("state", &self.state)
            .field("rect", &self.rect)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl Drop for SelectionSession {
    fn drop(&mut self) {
        // Every session reports back exactly once, even when abandoned.
        if let Some(completion) = self.completion.take() {
            completion(None);
        }
    }
}

/// Everything a background task needs to capture a released selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCapture {
    pub selection: Rect,
    pub window_frame: Rect,
}

impl PendingCapture {
    /// Waits `settle_delay`, calls `on_settled`, then captures and crops.
    ///
    /// `on_settled` is where a host moves its session on to
    /// [`SelectionState::Capturing`], typically via
    /// [`SelectionController::settled`].
    pub async fn execute(
        self,
        bridge: &FrameCaptureBridge,
        settle_delay: Duration,
        orientation: AxisOrientation,
        on_settled: impl FnOnce(),
    ) -> Option<RgbaImage> {
        tokio::time::sleep(settle_delay).await;
        on_settled();
        self.capture(bridge, orientation).await
    }

    /// Captures the display under the overlay and crops the selection.
    ///
    /// Failures are logged and yield `None`.
    pub async fn capture(
        self,
        bridge: &FrameCaptureBridge,
        orientation: AxisOrientation,
    ) -> Option<RgbaImage> {
        match self.try_capture(bridge, orientation).await {
            Ok(image) => image,
            Err(e) => {
                log::error!("Selection capture failed: {}", e);
                None
            }
        }
    }

    async fn try_capture(
        self,
        bridge: &FrameCaptureBridge,
        orientation: AxisOrientation,
    ) -> Result<Option<RgbaImage>, CaptureError> {
        let displays = bridge.displays()?;
        let display = *display_for_window(&displays, self.window_frame)
            .ok_or_else(|| CaptureError::start("overlay window is not on any display"))?;

        let frame = bridge
            .capture_one_frame(display.id, display.pixel_size())
            .await?;

        let region = selection_to_display(self.selection, self.window_frame, display.frame);
        let image = ImageProcessor::crop(&frame, region, &display, orientation);
        if image.is_none() {
            log::info!("Selection {:?} produced an empty crop", self.selection);
        }
        Ok(image)
    }
}

/// Identifies one selection session of a [`SelectionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

/// Owns the (at most one) live selection session of an overlay.
#[derive(Debug, Default)]
pub struct SelectionController {
    current: Option<(SessionId, SelectionSession)>,
    next_id: u64,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session, cancelling any prior one first.
    pub fn open(
        &mut self,
        completion: SelectionCompletion,
        host: &mut dyn OverlayHost,
    ) -> SessionId {
        self.close(host);
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.current = Some((id, SelectionSession::new(completion)));
        log::debug!("Opened selection session {:?}", id);
        id
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    pub fn session(&self) -> Option<&SelectionSession> {
        self.current.as_ref().map(|(_, s)| s)
    }

    pub fn session_mut(&mut self) -> Option<&mut SelectionSession> {
        self.current.as_mut().map(|(_, s)| s)
    }

    /// Marks the settle delay of session `id` as elapsed.
    ///
    /// Returns `false` if `id` is no longer the live session.
    pub fn settled(&mut self, id: SessionId) -> bool {
        match &mut self.current {
            Some((current, session)) if *current == id => {
                session.begin_capture();
                true
            }
            _ => false,
        }
    }

    /// Delivers a capture result to session `id`.
    ///
    /// Results for sessions that have since been replaced are dropped.
    /// Returns whether the result was delivered.
    pub fn complete(
        &mut self,
        id: SessionId,
        image: Option<RgbaImage>,
        host: &mut dyn OverlayHost,
    ) -> bool {
        match self.current.take() {
            Some((current, mut session)) if current == id => {
                session.complete(image, host);
                true
            }
            other => {
                log::debug!("Dropping capture result for stale session {:?}", id);
                self.current = other;
                false
            }
        }
    }

    /// Cancels the live session, if any.
    pub fn close(&mut self, host: &mut dyn OverlayHost) {
        if let Some((id, mut session)) = self.current.take() {
            log::debug!("Closing selection session {:?}", id);
            session.cancel(host);
        }
    }
}
