//! Pointer input for the selection drag.

use super::rendering::to_point;
use crate::geometry::Point;
use eframe::egui;

/// What the pointer did to the overlay this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragEvent {
    /// A drag began at this window point.
    Started(Point),
    /// The drag moved to this window point.
    Moved(Point),
    Released,
    None,
}

/// Reads the drag state of the full-window interaction `response`.
pub fn read_drag(response: &egui::Response) -> DragEvent {
    if response.drag_started() {
        // The press position, not where the drag threshold was crossed
        let origin = response
            .ctx
            .input(|i| i.pointer.press_origin())
            .or_else(|| response.interact_pointer_pos());
        return origin.map_or(DragEvent::None, |p| DragEvent::Started(to_point(p)));
    }

    if response.drag_stopped() {
        return DragEvent::Released;
    }

    if response.dragged() {
        return response
            .interact_pointer_pos()
            .map_or(DragEvent::None, |p| DragEvent::Moved(to_point(p)));
    }

    DragEvent::None
}
