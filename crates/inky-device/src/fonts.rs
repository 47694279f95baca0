//! Mono font table, text measurement and multi-line drawing.

use embedded_graphics::mono_font::ascii::{
    FONT_4X6, FONT_5X7, FONT_5X8, FONT_6X9, FONT_6X10, FONT_6X12, FONT_6X13, FONT_7X14,
    FONT_9X15, FONT_9X18, FONT_10X20,
};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use inky_core::buffer::clamp_font_size;

use crate::panel::TextExtent;

/// Available fonts, ordered by glyph height.
const FONTS: [&MonoFont<'static>; 11] = [
    &FONT_4X6, &FONT_5X7, &FONT_5X8, &FONT_6X9, &FONT_6X10, &FONT_6X12, &FONT_6X13, &FONT_7X14,
    &FONT_9X15, &FONT_9X18, &FONT_10X20,
];

/// Returns the tallest font whose glyphs fit in `font_size` pixels.
pub fn font_for_size(font_size: u32) -> &'static MonoFont<'static> {
    let size = clamp_font_size(font_size);
    FONTS
        .iter()
        .rev()
        .find(|font| font.character_size.height <= size)
        .copied()
        .unwrap_or(FONTS[0])
}

/// Returns the largest font in the table.
pub fn largest_font_size() -> u32 {
    FONTS[FONTS.len() - 1].character_size.height
}

/// Vertical advance per line: glyph height plus 20% spacing, rounded down.
pub fn line_height(font: &MonoFont<'_>) -> u32 {
    font.character_size.height * 6 / 5
}

fn line_width(font: &MonoFont<'_>, line: &str) -> u32 {
    let chars = line.chars().count() as u32;
    if chars == 0 {
        return 0;
    }
    chars * (font.character_size.width + font.character_spacing) - font.character_spacing
}

/// Measures `text`: widest line by summed line heights. A trailing newline
/// does not count as an extra line.
pub fn measure(text: &str, font_size: u32) -> TextExtent {
    let font = font_for_size(font_size);
    let advance = line_height(font);
    text.lines().fold(TextExtent::default(), |extent, line| TextExtent {
        width: extent.width.max(line_width(font, line)),
        height: extent.height + advance,
    })
}

/// Draws each line of `text` below the previous one, starting at `origin`.
///
/// # Errors
/// Returns the draw target's error.
pub fn draw_text<D>(
    target: &mut D,
    origin: Point,
    text: &str,
    font_size: u32,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let font = font_for_size(font_size);
    let style = MonoTextStyle::new(font, BinaryColor::On);
    let advance = line_height(font) as i32;

    for (index, line) in text.lines().enumerate() {
        let position = origin + Point::new(0, advance * index as i32);
        Text::with_baseline(line, position, style, Baseline::Top).draw(target)?;
    }
    Ok(())
}
