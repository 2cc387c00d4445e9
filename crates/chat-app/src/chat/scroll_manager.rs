use gpui::{Pixels, point, px};
use gpui_component::VirtualListScrollHandle;
use parley_core::{ScrollAffordance, ScrollFollow, ScrollGeometry, ScrollTolerance};

/// Reads a virtual list's scroll state in top-down positive pixels.
///
/// GPUI uses negative Y offsets for scrolling down, so the offset is flipped here.
pub fn geometry_of(handle: &VirtualListScrollHandle) -> ScrollGeometry {
    let viewport_height = f32::from(handle.bounds().size.height);
    let max_offset = f32::from(handle.max_offset().height).max(0.0);
    ScrollGeometry::new(
        viewport_height,
        viewport_height + max_offset,
        -f32::from(handle.offset().y),
    )
}

/// Moves a virtual list to `offset`, given in the same positive coordinates.
pub fn scroll_to(handle: &VirtualListScrollHandle, offset: f32) {
    let current_x = handle.offset().x;
    let target_y: Pixels = if offset > 0.0 { px(-offset) } else { Pixels::ZERO };
    handle.set_offset(point(current_x, target_y));
}

/// Binds tail-follow state to the message list's scroll handle.
pub struct ScrollManager {
    scroll_handle: VirtualListScrollHandle,
    follow: ScrollFollow,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            scroll_handle: VirtualListScrollHandle::new(),
            follow: ScrollFollow::new(),
        }
    }

    pub fn handle(&self) -> &VirtualListScrollHandle {
        &self.scroll_handle
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.follow.request_scroll_to_bottom();
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        self.follow.request_scroll_to_bottom_if_following();
    }

    pub fn scroll_to_top(&mut self) {
        self.follow.request_scroll_to_top();
        scroll_to(&self.scroll_handle, 0.0);
    }

    pub fn reset(&mut self) {
        self.follow.reset();
    }

    pub fn update_follow_state(&mut self) {
        self.follow.observe(geometry_of(&self.scroll_handle));
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        let geometry = geometry_of(&self.scroll_handle);
        match self.follow.take_scroll_target(geometry) {
            Some(offset) => {
                scroll_to(&self.scroll_handle, offset);
                true
            }
            None => false,
        }
    }

    pub fn content_width(&self) -> Pixels {
        self.scroll_handle.bounds().size.width
    }

    pub fn affordance(&self) -> ScrollAffordance {
        ScrollAffordance::from_geometry(
            geometry_of(&self.scroll_handle),
            ScrollTolerance::MESSAGE_LIST,
        )
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}
