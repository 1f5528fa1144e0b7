/// Scroll offsets into laid-out content, in terminal cells.
///
/// Offsets are kept within `content - viewport` on both axes; every setter re-clamps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportState {
    pub x: u32,
    pub y: u32,
    pub viewport_w: u16,
    pub viewport_h: u16,
    pub content_w: u32,
    pub content_h: u32,
}

impl ViewportState {
    pub fn set_viewport(&mut self, w: u16, h: u16) {
        self.viewport_w = w;
        self.viewport_h = h;
        self.clamp();
    }

    pub fn set_content(&mut self, w: u32, h: u32) {
        self.content_w = w;
        self.content_h = h;
        self.clamp();
    }

    pub fn clamp(&mut self) {
        self.x = self.x.min(self.max_x());
        self.y = self.y.min(self.max_y());
    }

    pub fn scroll_y_by(&mut self, delta: i32) {
        self.y = self.y.saturating_add_signed(delta).min(self.max_y());
    }

    pub fn scroll_x_by(&mut self, delta: i32) {
        self.x = self.x.saturating_add_signed(delta).min(self.max_x());
    }

    /// Scrolls by one screen, keeping a line of overlap.
    pub fn page_down(&mut self) {
        self.scroll_y_by(i32::from(self.page_step()));
    }

    pub fn page_up(&mut self) {
        self.scroll_y_by(-i32::from(self.page_step()));
    }

    pub fn to_top(&mut self) {
        self.y = 0;
    }

    pub fn to_bottom(&mut self) {
        self.y = self.max_y();
    }

    /// True when the last content row is visible, including when everything fits.
    pub fn is_at_bottom(&self) -> bool {
        self.y >= self.max_y()
    }

    fn page_step(&self) -> u16 {
        self.viewport_h.saturating_sub(1).max(1)
    }

    fn max_y(&self) -> u32 {
        self.content_h.saturating_sub(u32::from(self.viewport_h))
    }

    fn max_x(&self) -> u32 {
        self.content_w.saturating_sub(u32::from(self.viewport_w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(view: (u16, u16), content: (u32, u32)) -> ViewportState {
        let mut s = ViewportState::default();
        s.set_viewport(view.0, view.1);
        s.set_content(content.0, content.1);
        s
    }

    #[test]
    fn offsets_never_pass_the_content_edge() {
        let mut s = state((10, 5), (12, 6));
        s.scroll_x_by(99);
        s.scroll_y_by(99);
        assert_eq!((s.x, s.y), (2, 1));
        s.scroll_y_by(-99);
        assert_eq!(s.y, 0);
    }

    #[test]
    fn shrinking_content_pulls_offsets_back() {
        let mut s = state((10, 5), (40, 40));
        s.to_bottom();
        s.scroll_x_by(30);
        s.set_content(12, 8);
        assert_eq!((s.x, s.y), (2, 3));
    }

    #[test]
    fn growth_leaves_the_bottom() {
        let mut s = state((10, 5), (10, 20));
        s.to_bottom();
        assert!(s.is_at_bottom());
        s.set_content(10, 30);
        assert!(!s.is_at_bottom());
        s.to_bottom();
        assert_eq!(s.y, 25);
    }

    #[test]
    fn paging_overlaps_one_line() {
        let mut s = state((10, 5), (10, 50));
        s.page_down();
        assert_eq!(s.y, 4);
        s.page_up();
        assert_eq!(s.y, 0);
        let mut tiny = state((10, 1), (10, 50));
        tiny.page_down();
        assert_eq!(tiny.y, 1);
    }
}
