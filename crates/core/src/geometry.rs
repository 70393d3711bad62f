//! Coordinate conversions between the overlay, the desktop and pixel buffers.
//!
//! A selection travels through four spaces:
//!
//! 1. **drag-local**: relative to the overlay window's content area
//! 2. **global**: the multi-monitor desktop space
//! 3. **monitor-relative**: relative to the display being captured, because a
//!    capture buffer is always addressed from its own display's origin
//! 4. **image**: top-down rows of the pixel buffer
//!
//! [`selection_to_display_image`] composes the steps in exactly that order.
//! Hosts whose window coordinates grow upwards ([`AxisOrientation::BottomUp`])
//! need the final vertical reflection; top-down hosts such as egui skip it.

/// A point in any of the coordinate spaces above.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of a rectangle or display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle described by its origin and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A zero-sized rectangle at `origin`.
    pub const fn at(origin: Point) -> Self {
        Self::new(origin.x, origin.y, 0.0, 0.0)
    }

    /// Builds the normalized rectangle spanned by two drag points.
    ///
    /// The origin is always the minimum corner and the size is the absolute
    /// delta, so every drag direction produces the same rectangle.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (a.x - b.x).abs(),
            (a.y - b.y).abs(),
        )
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// True when the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment: the left/top edges are inside, the right/bottom
    /// edges belong to the neighbouring rectangle.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.max_x() && p.y >= self.y && p.y < self.max_y()
    }

    /// Overlap of two rectangles, or `None` if they do not share any area.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        let rect = Rect::new(x, y, max_x - x, max_y - y);
        (!rect.is_empty()).then_some(rect)
    }

    /// Multiplies every component, e.g. to go from points to pixels.
    pub fn scaled(&self, sx: f64, sy: f64) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Which way the vertical axis of a window coordinate system grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrientation {
    /// Origin at the upper-left, y grows downwards (egui, X11, Windows).
    #[default]
    TopDown,
    /// Origin at the lower-left, y grows upwards (AppKit).
    BottomUp,
}

/// Translates a window-local rectangle into global desktop coordinates.
pub fn to_global_screen(rect: Rect, window_frame: Rect) -> Rect {
    Rect::new(
        rect.x + window_frame.x,
        rect.y + window_frame.y,
        rect.width,
        rect.height,
    )
}

/// Reflects a bottom-up rectangle into top-down buffer coordinates.
pub fn to_flipped_image_space(rect: Rect, container_height: f64) -> Rect {
    Rect::new(
        rect.x,
        container_height - rect.y - rect.height,
        rect.width,
        rect.height,
    )
}

/// Expresses a global rectangle relative to one monitor's origin.
pub fn relative_to_screen(rect: Rect, screen_origin: Point) -> Rect {
    Rect::new(
        rect.x - screen_origin.x,
        rect.y - screen_origin.y,
        rect.width,
        rect.height,
    )
}

/// Local → global → monitor-relative, the part shared by every host.
pub fn selection_to_display(local: Rect, window_frame: Rect, display_frame: Rect) -> Rect {
    let global = to_global_screen(local, window_frame);
    relative_to_screen(global, display_frame.origin())
}

/// The full composition: local → global → monitor-relative → flipped.
///
/// The flip uses the target display's own height, never the desktop height;
/// each display has independent flip math.
pub fn selection_to_display_image(
    local: Rect,
    window_frame: Rect,
    display_frame: Rect,
    orientation: AxisOrientation,
) -> Rect {
    let relative = selection_to_display(local, window_frame, display_frame);
    match orientation {
        AxisOrientation::TopDown => relative,
        AxisOrientation::BottomUp => to_flipped_image_space(relative, display_frame.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_normalize_in_every_quadrant() {
        let start = Point::new(100.0, 100.0);
        let expected = |x, y| Rect::new(x, y, 40.0, 30.0);

        // down-right, down-left, up-right, up-left
        assert_eq!(Rect::from_corners(start, Point::new(140.0, 130.0)), expected(100.0, 100.0));
        assert_eq!(Rect::from_corners(start, Point::new(60.0, 130.0)), expected(60.0, 100.0));
        assert_eq!(Rect::from_corners(start, Point::new(140.0, 70.0)), expected(100.0, 70.0));
        assert_eq!(Rect::from_corners(start, Point::new(60.0, 70.0)), expected(60.0, 70.0));
    }

    #[test]
    fn flip_reflects_within_container() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(to_flipped_image_space(rect, 100.0), Rect::new(10.0, 40.0, 30.0, 40.0));
        // flipping twice is the identity
        assert_eq!(
            to_flipped_image_space(to_flipped_image_space(rect, 100.0), 100.0),
            rect
        );
    }

    #[test]
    fn secondary_monitor_round_trips() {
        // Secondary display to the left of and above the primary one.
        let display = Rect::new(-1920.0, -300.0, 1920.0, 1080.0);
        // Overlay window covers the secondary display exactly.
        let window = display;
        let local = Rect::new(250.0, 125.0, 300.0, 200.0);

        let global = to_global_screen(local, window);
        assert_eq!(global, Rect::new(-1670.0, -175.0, 300.0, 200.0));
        assert_eq!(relative_to_screen(global, display.origin()), local);
    }

    #[test]
    fn composition_flips_only_bottom_up_hosts() {
        let display = Rect::new(1440.0, 0.0, 1440.0, 900.0);
        let window = display;
        let local = Rect::new(100.0, 100.0, 200.0, 50.0);

        assert_eq!(
            selection_to_display_image(local, window, display, AxisOrientation::TopDown),
            local
        );
        assert_eq!(
            selection_to_display_image(local, window, display, AxisOrientation::BottomUp),
            Rect::new(100.0, 750.0, 200.0, 50.0)
        );
    }

    #[test]
    fn intersection_and_containment() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(
            a.intersection(&Rect::new(80.0, 90.0, 50.0, 50.0)),
            Some(Rect::new(80.0, 90.0, 20.0, 10.0))
        );
        assert_eq!(a.intersection(&Rect::new(100.0, 0.0, 10.0, 10.0)), None);
        assert!(a.contains(Point::new(0.0, 99.9)));
        assert!(!a.contains(Point::new(100.0, 50.0)));
    }
}
