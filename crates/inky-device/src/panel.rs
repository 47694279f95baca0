//! The seam between the consumer and the panel hardware.

use anyhow::Result;

/// Width and height of a block of text, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextExtent {
    pub width: u32,
    pub height: u32,
}

/// A drawable e-ink surface with an offscreen frame.
///
/// Drawing only touches the offscreen frame; nothing reaches the panel until
/// [`Panel::flush`], which is the slow, visible refresh.
pub trait Panel {
    /// Surface width and height in pixels.
    fn size(&self) -> (u32, u32);

    /// Measures multi-line `text` as it would be drawn at `font_size`.
    fn measure(&self, text: &str, font_size: u32) -> TextExtent;

    /// Blanks the offscreen frame.
    fn clear(&mut self);

    /// Draws `text` with its top-left corner at (`x`, `y`). Pixels outside
    /// the surface are dropped.
    fn draw_text(&mut self, x: i32, y: i32, text: &str, font_size: u32);

    /// Pushes the offscreen frame to the panel.
    ///
    /// # Errors
    /// Returns an error if the panel could not be refreshed.
    fn flush(&mut self) -> Result<()>;
}
