//! Named blocks of text rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Font size used when a caller does not ask for one.
pub const DEFAULT_FONT_SIZE: u32 = 12;
/// Smallest glyph height the panel can draw, in pixels.
pub const MIN_FONT_SIZE: u32 = 6;
/// Largest glyph height the panel can draw, in pixels.
pub const MAX_FONT_SIZE: u32 = 20;

/// Clamps a requested font size into the drawable range.
pub fn clamp_font_size(font_size: u32) -> u32 {
    font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// A buffer's text as of one render, paired with the font it is drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBuffer {
    pub content: String,
    pub font_size: u32,
}

/// Text rows keyed by row name, rendered in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    font_size: u32,
    rows: BTreeMap<String, String>,
}

impl Buffer {
    /// Creates an empty buffer. The font size is clamped into the drawable range.
    pub fn new(font_size: u32) -> Self {
        Self {
            font_size: clamp_font_size(font_size),
            rows: BTreeMap::new(),
        }
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    /// Inserts or overwrites a row.
    pub fn update_row(&mut self, key: impl Into<String>, content: impl Into<String>) {
        self.rows.insert(key.into(), content.into());
    }

    /// Drops every row; the font size stays.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Renders rows in ascending key order, each followed by `\n`.
    ///
    /// The last row gets a separator too, so an empty buffer renders to an
    /// empty string and a one-row buffer renders to `"row\n"`.
    pub fn render(&self) -> RenderedBuffer {
        let mut content = String::new();
        for row in self.rows.values() {
            content.push_str(row);
            content.push('\n');
        }
        RenderedBuffer {
            content,
            font_size: self.font_size,
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(DEFAULT_FONT_SIZE)
    }
}
