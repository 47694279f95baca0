//! A panel that refreshes by writing its frame to a PNG file.

use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use image::{GrayImage, ImageFormat, Luma};

use crate::fonts;
use crate::panel::{Panel, TextExtent};

const INK: Luma<u8> = Luma([0]);
const PAPER: Luma<u8> = Luma([255]);

/// One-bit offscreen frame backed by a grayscale image.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: GrayImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, PAPER),
        }
    }

    #[cfg(test)]
    fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Whether the pixel at (`x`, `y`) is inked.
    #[cfg(test)]
    fn is_inked(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel_checked(x, y) == Some(&INK)
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.image.dimensions();
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y))
                && x < width
                && y < height
            {
                self.image
                    .put_pixel(x, y, if color.is_on() { INK } else { PAPER });
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = if color.is_on() { INK } else { PAPER };
        for pixel in self.image.pixels_mut() {
            *pixel = fill;
        }
        Ok(())
    }
}

/// Panel whose refresh writes the frame to `output` as a PNG.
///
/// The file is replaced atomically, so a reader never sees a half-written frame.
#[derive(Debug)]
pub struct PngPanel {
    canvas: Canvas,
    output: PathBuf,
}

impl PngPanel {
    pub fn new(width: u32, height: u32, output: impl Into<PathBuf>) -> Self {
        Self {
            canvas: Canvas::new(width, height),
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

impl Panel for PngPanel {
    fn size(&self) -> (u32, u32) {
        self.canvas.image.dimensions()
    }

    fn measure(&self, text: &str, font_size: u32) -> TextExtent {
        fonts::measure(text, font_size)
    }

    fn clear(&mut self) {
        match self.canvas.clear(BinaryColor::Off) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str, font_size: u32) {
        match fonts::draw_text(&mut self.canvas, Point::new(x, y), text, font_size) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(parent) = self.output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create panel output dir {}", parent.display()))?;
        }

        let tmp = self.output.with_extension("png.tmp");
        self.canvas
            .image
            .save_with_format(&tmp, ImageFormat::Png)
            .with_context(|| format!("write panel frame {}", tmp.display()))?;
        fs::rename(&tmp, &self.output).with_context(|| {
            format!(
                "persist panel frame from {} to {}",
                tmp.display(),
                self.output.display()
            )
        })?;
        Ok(())
    }
}
