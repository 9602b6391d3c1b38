//! Art rendering over a transport
//!
//! The screen is split into a content area and an optional static footer of
//! at most two rows. Content taller than the area scrolls through a
//! [`Viewport`]; scrolling repaints only the content rows.

use tracing::debug;

use super::art::{Art, TextMode};
use super::viewport::Viewport;
use super::wrap;
use crate::core::term::{ansi, TerminalGeometry};
use crate::core::transport::{Result, Transport};

/// Footer rows kept on screen at most
pub const MAX_FOOTER_ROWS: usize = 2;

/// Rendering settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Trim lines that would wrap on the last row
    pub wrap_guard: bool,
    /// Allow content taller than the screen to scroll
    pub scrolling: bool,
    pub mode: TextMode,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wrap_guard: true,
            scrolling: true,
            mode: TextMode::Cp437,
        }
    }
}

/// Draws art screens and keeps track of the scroll position
pub struct RenderPipeline {
    geometry: TerminalGeometry,
    options: RenderOptions,
    footer: Vec<Vec<u8>>,
    content: Vec<Vec<u8>>,
    viewport: Viewport,
}

impl RenderPipeline {
    pub fn new(geometry: TerminalGeometry, options: RenderOptions) -> Self {
        let mut pipeline = Self {
            geometry,
            options,
            footer: Vec::new(),
            content: Vec::new(),
            viewport: Viewport::new(0, 1),
        };
        pipeline.viewport = Viewport::new(0, pipeline.usable_height());
        pipeline
    }

    #[cfg(test)]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Install the footer; only the first two lines are used, and never
    /// more than the screen can hold below one content row
    pub fn set_footer(&mut self, footer: Option<&Art>) {
        self.footer = footer
            .map(|art| art.lines.iter().take(MAX_FOOTER_ROWS).cloned().collect())
            .unwrap_or_default();
        self.viewport.set_visible(self.usable_height());
    }

    /// Rows available to content
    pub fn usable_height(&self) -> usize {
        usize::from(self.geometry.rows)
            .saturating_sub(self.footer_rows())
            .max(1)
    }

    /// Footer lines that fit on this screen
    fn footer_rows(&self) -> usize {
        self.footer
            .len()
            .min(usize::from(self.geometry.rows).saturating_sub(1))
    }

    /// Replace the content and scroll back to the top
    pub fn load(&mut self, art: &Art) {
        self.content = art.lines.clone();
        let total = if self.options.scrolling {
            self.content.len()
        } else {
            self.content.len().min(self.usable_height())
        };
        self.viewport.set_visible(self.usable_height());
        self.viewport.set_total(total);
        self.viewport.scroll_to_top();
        debug!(lines = self.content.len(), usable = self.usable_height(), "Art loaded");
    }

    /// Clear the screen, draw the footer, then the visible content
    pub fn render_full(&mut self, transport: &mut dyn Transport) -> Result<()> {
        let mut out = Vec::with_capacity(4096);
        out.extend_from_slice(ansi::RESET.as_bytes());
        out.extend_from_slice(ansi::CLEAR_HOME.as_bytes());
        self.draw_footer(&mut out);

        out.extend_from_slice(ansi::move_to(1, 1).as_bytes());
        let range = self.viewport.range();
        let count = range.len();
        let single_block = self.content.len() == 1;

        for (i, idx) in range.enumerate() {
            let row = i + 1;
            let line = &self.content[idx];
            let line = if single_block && self.options.wrap_guard {
                self.guard_block(line)
            } else {
                self.guard_line(line, row == usize::from(self.geometry.rows))
            };
            out.extend_from_slice(&line);
            if i + 1 < count {
                out.extend_from_slice(b"\r\n");
            }
        }

        transport.write_all(&out)?;
        transport.flush()
    }

    /// Repaint the content rows in place; the footer is left alone
    pub fn render_incremental(&mut self, transport: &mut dyn Transport) -> Result<()> {
        let usable = self.usable_height();
        let rows = usize::from(self.geometry.rows);
        let range = self.viewport.range();

        let mut out = Vec::with_capacity(4096);
        for row in 1..=usable {
            out.extend_from_slice(ansi::move_to(row as u16, 1).as_bytes());
            if let Some(line) = self.content.get(range.start + row - 1).filter(|_| row <= range.len()) {
                // The erase that follows would spill onto the footer after a wrap
                let guarded = self.guard_line(line, row == usable || row == rows);
                out.extend_from_slice(&guarded);
            }
            out.extend_from_slice(ansi::ERASE_EOL.as_bytes());
        }

        transport.write_all(&out)?;
        transport.flush()
    }

    /// Scroll up one line and repaint if anything moved
    pub fn scroll_up(&mut self, transport: &mut dyn Transport) -> Result<bool> {
        if !self.viewport.scroll_up(1) {
            return Ok(false);
        }
        self.render_incremental(transport)?;
        Ok(true)
    }

    /// Scroll down one line and repaint if anything moved
    pub fn scroll_down(&mut self, transport: &mut dyn Transport) -> Result<bool> {
        if !self.viewport.scroll_down(1) {
            return Ok(false);
        }
        self.render_incremental(transport)?;
        Ok(true)
    }

    /// Bright status text in the bottom right corner, cursor preserved
    pub fn render_status(&mut self, transport: &mut dyn Transport, text: &str) -> Result<()> {
        let cols = usize::from(self.geometry.cols);
        // Stay clear of the last cell
        let text = wrap::trim_visible(text.as_bytes(), cols, TextMode::Utf8);
        let width = wrap::count_visible(&text, TextMode::Utf8);
        let col = cols.saturating_sub(width).max(1);

        let mut out = Vec::with_capacity(text.len() + 32);
        out.extend_from_slice(ansi::SAVE_CURSOR.as_bytes());
        out.extend_from_slice(ansi::move_to(self.geometry.rows, col as u16).as_bytes());
        out.extend_from_slice(ansi::HIGHLIGHT.as_bytes());
        out.extend_from_slice(&text);
        out.extend_from_slice(ansi::RESET.as_bytes());
        out.extend_from_slice(ansi::RESTORE_CURSOR.as_bytes());
        transport.write_all(&out)?;
        transport.flush()
    }

    /// Replace the bottom row with a bold prompt
    pub fn render_prompt(&mut self, transport: &mut dyn Transport, text: &str) -> Result<()> {
        let cols = usize::from(self.geometry.cols);
        let text = wrap::trim_visible(text.as_bytes(), cols, TextMode::Utf8);

        let mut out = Vec::with_capacity(text.len() + 24);
        out.extend_from_slice(ansi::move_to(self.geometry.rows, 1).as_bytes());
        out.extend_from_slice(ansi::ERASE_LINE.as_bytes());
        out.extend_from_slice(ansi::BOLD_WHITE.as_bytes());
        out.extend_from_slice(&text);
        out.extend_from_slice(ansi::RESET.as_bytes());
        transport.write_all(&out)?;
        transport.flush()
    }

    fn draw_footer(&self, out: &mut Vec<u8>) {
        let shown = self.footer_rows();
        if shown == 0 {
            return;
        }
        let rows = usize::from(self.geometry.rows);
        let start = rows - shown + 1;
        out.extend_from_slice(ansi::move_to(start as u16, 1).as_bytes());
        out.extend_from_slice(ansi::RESET.as_bytes());
        for (i, line) in self.footer[..shown].iter().enumerate() {
            let row = start + i;
            out.extend_from_slice(&self.guard_line(line, row == rows));
            if i + 1 < shown {
                out.extend_from_slice(b"\r\n");
            }
        }
    }

    fn guard_line(&self, line: &[u8], final_row: bool) -> Vec<u8> {
        if !self.options.wrap_guard {
            return line.to_vec();
        }
        let TerminalGeometry { cols, rows } = self.geometry;
        let line = wrap::rewrite_last_cell(line, rows, cols);
        if final_row {
            wrap::guard_last_row(&line, cols, self.options.mode)
        } else {
            line
        }
    }

    fn guard_block(&self, block: &[u8]) -> Vec<u8> {
        let TerminalGeometry { cols, rows } = self.geometry;
        let block = wrap::rewrite_last_cell(block, rows, cols);
        wrap::guard_block(&block, rows, cols, self.options.mode)
    }
}
