/// Distance from the tail, in pixels, that still counts as "at the bottom" for follow mode.
const FOLLOW_TOLERANCE: f32 = 50.0;
/// Near-bottom distance used to resume follow mode after the viewer scrolled away.
const AUTO_FOLLOW_RESUME_THRESHOLD: f32 = 24.0;
/// Small delta used to ignore floating-point scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 1.0;

/// Distance the sidebar hint buttons move the list by.
pub const SIDEBAR_SCROLL_STEP: f32 = 150.0;

/// Scroll position of a vertical viewport, measured from the top in positive pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollGeometry {
    pub viewport_height: f32,
    pub content_height: f32,
    pub offset: f32,
}

impl ScrollGeometry {
    pub fn new(viewport_height: f32, content_height: f32, offset: f32) -> Self {
        Self {
            viewport_height,
            content_height,
            offset,
        }
    }

    pub fn max_offset(&self) -> f32 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    pub fn distance_to_bottom(&self) -> f32 {
        (self.max_offset() - self.offset).max(0.0)
    }

    /// Offset after moving by `delta`, clamped to the scrollable range.
    pub fn offset_by(&self, delta: f32) -> f32 {
        (self.offset + delta).clamp(0.0, self.max_offset())
    }
}

/// Thresholds deciding when scroll hint buttons show up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTolerance {
    /// Content must exceed the viewport by more than this before any hint appears.
    pub overflow: f32,
    /// Distance from an edge below which the viewer counts as sitting on it.
    pub edge: f32,
}

impl ScrollTolerance {
    pub const SIDEBAR: Self = Self {
        overflow: 5.0,
        edge: 10.0,
    };
    pub const MESSAGE_LIST: Self = Self {
        overflow: 10.0,
        edge: 50.0,
    };
}

/// Which scroll hint buttons a viewport should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollAffordance {
    pub up: bool,
    pub down: bool,
}

impl ScrollAffordance {
    pub fn from_geometry(geometry: ScrollGeometry, tolerance: ScrollTolerance) -> Self {
        let overflows = geometry.content_height > geometry.viewport_height + tolerance.overflow;
        if !overflows {
            return Self::default();
        }

        Self {
            up: geometry.offset > tolerance.edge,
            down: geometry.offset < geometry.max_offset() - tolerance.edge,
        }
    }

    pub fn any(&self) -> bool {
        self.up || self.down
    }
}

/// Tail-follow behaviour for a live message list, independent of how it is drawn.
///
/// Feed it every observed geometry, then ask where to scroll. While following, new
/// content keeps the viewport pinned to the bottom; a manual scroll up pauses that
/// until the viewer comes back near the tail.
#[derive(Debug, Clone)]
pub struct ScrollFollow {
    pending_scroll_to_bottom: bool,
    follow_bottom: bool,
    last: ScrollGeometry,
}

impl ScrollFollow {
    pub fn new() -> Self {
        Self {
            pending_scroll_to_bottom: false,
            follow_bottom: true,
            last: ScrollGeometry::default(),
        }
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.follow_bottom = true;
    }

    /// Scrolling to the top is a manual move away from the tail.
    pub fn request_scroll_to_top(&mut self) {
        self.pending_scroll_to_bottom = false;
        self.follow_bottom = false;
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        if self.follow_bottom || self.was_near_bottom() {
            self.pending_scroll_to_bottom = true;
        }
    }

    /// Forgets the previous list, e.g. after switching chats.
    pub fn reset(&mut self) {
        self.last = ScrollGeometry::default();
        self.follow_bottom = true;
        self.pending_scroll_to_bottom = true;
    }

    pub fn observe(&mut self, geometry: ScrollGeometry) {
        let offset_delta = geometry.offset - self.last.offset;
        let max_delta = (geometry.max_offset() - self.last.max_offset()).abs();
        let content_size_changed = max_delta > SCROLL_DELTA_EPSILON;
        let user_scrolled_up = offset_delta < -SCROLL_DELTA_EPSILON && !content_size_changed;
        let user_scrolled_down = offset_delta > SCROLL_DELTA_EPSILON && !content_size_changed;

        if self.pending_scroll_to_bottom || (content_size_changed && self.was_near_bottom()) {
            self.follow_bottom = true;
        } else if self.follow_bottom {
            if user_scrolled_up {
                self.follow_bottom = false;
            }
        } else if user_scrolled_down
            && geometry.distance_to_bottom() <= AUTO_FOLLOW_RESUME_THRESHOLD
        {
            self.follow_bottom = true;
        }

        self.last = geometry;
    }

    /// Offset to scroll to now, if any. Consumes an explicit bottom request.
    pub fn take_scroll_target(&mut self, geometry: ScrollGeometry) -> Option<f32> {
        let should_scroll = self.follow_bottom || self.pending_scroll_to_bottom;
        self.pending_scroll_to_bottom = false;
        should_scroll.then(|| geometry.max_offset())
    }

    fn was_near_bottom(&self) -> bool {
        self.last.max_offset() <= 0.0 || self.last.distance_to_bottom() < FOLLOW_TOLERANCE
    }
}

impl Default for ScrollFollow {
    fn default() -> Self {
        Self::new()
    }
}
