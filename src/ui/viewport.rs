//! Scroll window over a list of lines

use std::ops::Range;

/// Visible window onto `total` lines.
///
/// `offset` always stays within `0..=total.saturating_sub(visible)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    offset: usize,
    total: usize,
    visible: usize,
}

impl Viewport {
    pub fn new(total: usize, visible: usize) -> Self {
        Self {
            offset: 0,
            total,
            visible: visible.max(1),
        }
    }

    #[cfg(test)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.total
    }

    #[cfg(test)]
    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn max_offset(&self) -> usize {
        self.total.saturating_sub(self.visible)
    }

    /// Indices of the lines currently on screen
    pub fn range(&self) -> Range<usize> {
        self.offset..(self.offset + self.visible).min(self.total)
    }

    /// Move up by `lines`; returns whether the offset changed
    pub fn scroll_up(&mut self, lines: usize) -> bool {
        let before = self.offset;
        self.offset = self.offset.saturating_sub(lines);
        self.offset != before
    }

    /// Move down by `lines`; returns whether the offset changed
    pub fn scroll_down(&mut self, lines: usize) -> bool {
        let before = self.offset;
        self.offset = self.offset.saturating_add(lines).min(self.max_offset());
        self.offset != before
    }

    pub fn scroll_to_top(&mut self) -> bool {
        self.scroll_up(self.offset)
    }

    /// New content: keep the offset where possible
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.clamp();
    }

    /// New screen height
    pub fn set_visible(&mut self, visible: usize) {
        self.visible = visible.max(1);
        self.clamp();
    }

    fn clamp(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }
}
