//! Drawing helpers for the overlay.

use crate::geometry::{Point, Rect};
use eframe::egui;

/// Opacity of the dimmed backdrop (20% black).
pub const BACKDROP_ALPHA: u8 = 51;

pub fn to_point(pos: egui::Pos2) -> Point {
    Point::new(f64::from(pos.x), f64::from(pos.y))
}

pub fn to_rect(rect: egui::Rect) -> Rect {
    Rect::new(
        f64::from(rect.min.x),
        f64::from(rect.min.y),
        f64::from(rect.width()),
        f64::from(rect.height()),
    )
}

pub fn to_egui_rect(rect: Rect) -> egui::Rect {
    egui::Rect::from_min_size(
        egui::pos2(rect.x as f32, rect.y as f32),
        egui::vec2(rect.width as f32, rect.height as f32),
    )
}

/// Dims `screen_rect`, leaving `cutout` (if any) clear.
///
/// The dimmed area is painted as up to four bands around the cut-out so the
/// selection shows the desktop undimmed.
pub fn draw_backdrop(painter: &egui::Painter, screen_rect: egui::Rect, cutout: Option<egui::Rect>) {
    let color = egui::Color32::from_black_alpha(BACKDROP_ALPHA);
    let Some(hole) = cutout.map(|c| c.intersect(screen_rect)).filter(|c| c.is_positive()) else {
        painter.rect_filled(screen_rect, 0.0, color);
        return;
    };

    let bands = [
        // above
        egui::Rect::from_min_max(screen_rect.min, egui::pos2(screen_rect.max.x, hole.min.y)),
        // below
        egui::Rect::from_min_max(egui::pos2(screen_rect.min.x, hole.max.y), screen_rect.max),
        // left
        egui::Rect::from_min_max(
            egui::pos2(screen_rect.min.x, hole.min.y),
            egui::pos2(hole.min.x, hole.max.y),
        ),
        // right
        egui::Rect::from_min_max(
            egui::pos2(hole.max.x, hole.min.y),
            egui::pos2(screen_rect.max.x, hole.max.y),
        ),
    ];
    for band in bands.into_iter().filter(|b| b.is_positive()) {
        painter.rect_filled(band, 0.0, color);
    }
}

/// Outlines the live selection.
pub fn draw_selection_border(painter: &egui::Painter, selection_rect: egui::Rect) {
    painter.rect_stroke(
        selection_rect,
        0.0,
        egui::Stroke::new(2.0, egui::Color32::WHITE),
        egui::StrokeKind::Middle,
    );
}

/// Places a panel of `panel_width` next to a selection.
///
/// Below the selection when `min_space_needed` fits there, above it when the
/// space above is larger. Horizontally centred on the selection and kept
/// 10 points inside the screen.
///
/// Returns the anchor position and the pivot to anchor with.
pub fn calculate_popup_position(
    selection_rect: egui::Rect,
    screen_rect: egui::Rect,
    panel_width: f32,
    spacing: f32,
    min_space_needed: f32,
) -> (egui::Pos2, egui::Align2) {
    let max_x = (screen_rect.max.x - panel_width - 10.0).max(screen_rect.min.x + 10.0);
    let x = (selection_rect.center().x - panel_width / 2.0).clamp(screen_rect.min.x + 10.0, max_x);

    let below = selection_rect.max.y + spacing;
    let space_below = screen_rect.max.y - below;
    let space_above = selection_rect.min.y - screen_rect.min.y;

    if space_below < min_space_needed && space_above > space_below {
        (
            egui::pos2(x, selection_rect.min.y - spacing),
            egui::Align2::LEFT_BOTTOM,
        )
    } else {
        (egui::pos2(x, below), egui::Align2::LEFT_TOP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(1920.0, 1080.0))
    }

    #[test]
    fn rect_conversion_round_trips() {
        let rect = Rect::new(12.0, 34.0, 56.0, 78.0);
        assert_eq!(to_rect(to_egui_rect(rect)), rect);
        assert_eq!(to_point(egui::pos2(3.0, 4.0)), Point::new(3.0, 4.0));
    }

    #[test]
    fn popup_goes_below_when_there_is_room() {
        let selection =
            egui::Rect::from_min_size(egui::pos2(100.0, 100.0), egui::vec2(200.0, 100.0));
        let (pos, pivot) = calculate_popup_position(selection, screen(), 400.0, 10.0, 400.0);

        assert_eq!(pivot, egui::Align2::LEFT_TOP);
        assert_eq!(pos, egui::pos2(10.0, 210.0));
    }

    #[test]
    fn popup_flips_above_near_the_bottom() {
        let selection =
            egui::Rect::from_min_size(egui::pos2(800.0, 900.0), egui::vec2(200.0, 100.0));
        let (pos, pivot) = calculate_popup_position(selection, screen(), 400.0, 10.0, 400.0);

        assert_eq!(pivot, egui::Align2::LEFT_BOTTOM);
        assert_eq!(pos, egui::pos2(700.0, 890.0));
    }

    #[test]
    fn popup_stays_on_screen_at_the_right_edge() {
        let selection =
            egui::Rect::from_min_size(egui::pos2(1850.0, 100.0), egui::vec2(60.0, 60.0));
        let (pos, _) = calculate_popup_position(selection, screen(), 400.0, 10.0, 400.0);
        assert_eq!(pos.x, 1510.0);
    }
}
