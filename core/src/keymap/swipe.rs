//! Touch swipe recognition.

use tracing::trace;

use crate::types::Point;

use super::Swipe;

/// Minimum travel, as a fraction of the viewport, for a swipe to count.
pub const SWIPE_THRESHOLD: f32 = 0.15;

/// Width assumed when the host cannot measure the rendered content.
pub const DEFAULT_VIEWPORT_WIDTH: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Classify the travel from `start` to `end`.
///
/// Horizontal and vertical travel are compared as ratios of the viewport's width and height,
/// and the horizontal reading wins whenever it clears the threshold first.
pub fn classify_swipe(start: Point, end: Point, viewport: Viewport) -> Option<Swipe> {
    let width = if viewport.width > 0.0 { viewport.width } else { DEFAULT_VIEWPORT_WIDTH };
    let hr = (end.x - start.x) / width;
    let vr = if viewport.height > 0.0 { (end.y - start.y) / viewport.height } else { 0.0 };

    if hr > vr && hr > SWIPE_THRESHOLD {
        Some(Swipe::Right)
    } else if hr < vr && hr < -SWIPE_THRESHOLD {
        Some(Swipe::Left)
    } else if vr > hr && vr > SWIPE_THRESHOLD {
        Some(Swipe::Down)
    } else if vr < hr && vr < -SWIPE_THRESHOLD {
        Some(Swipe::Up)
    } else {
        None
    }
}

/// Follows one touch sequence. A swipe is only reported when the finger moved between
/// start and end; a plain tap yields nothing.
#[derive(Debug, Default)]
pub struct SwipeTracker {
    start: Option<Point>,
    moving: bool,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_start(&mut self, point: Point) {
        self.start = Some(point);
        self.moving = false;
    }

    /// A move can arrive before its start was seen; it then stands in for the start.
    pub fn touch_move(&mut self, point: Point) {
        self.moving = true;
        if self.start.is_none() {
            self.start = Some(point);
        }
    }

    pub fn touch_end(&mut self, point: Point, viewport: Viewport) -> Option<Swipe> {
        let start = self.start.take();
        let moved = std::mem::take(&mut self.moving);
        let swipe = match start {
            Some(start) if moved => classify_swipe(start, point, viewport),
            _ => None,
        };
        trace!(target: "keymap", ?swipe, "touch end");
        swipe
    }
}
