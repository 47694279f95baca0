//! Anchor points on the display surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScreenError;

/// Where a buffer is anchored on the panel.
///
/// Each variant maps a content box to the pixel offset that pins it to a
/// corner, an edge, or the middle of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
    Center,
    CenterLeft,
    CenterRight,
}

impl Location {
    /// Returns the top-left offset for a `content_width` x `content_height` box
    /// on a `surface_width` x `surface_height` surface.
    ///
    /// Offsets go negative when the content is larger than the surface; the
    /// panel clips whatever falls outside.
    pub fn place(
        self,
        content_width: u32,
        content_height: u32,
        surface_width: u32,
        surface_height: u32,
    ) -> (i32, i32) {
        let right = surface_width as i32 - content_width as i32;
        let bottom = surface_height as i32 - content_height as i32;
        let middle_x = right.div_euclid(2);
        let middle_y = bottom.div_euclid(2);

        match self {
            Location::UpperLeft => (0, 0),
            Location::UpperRight => (right, 0),
            Location::LowerLeft => (0, bottom),
            Location::LowerRight => (right, bottom),
            Location::Center => (middle_x, middle_y),
            Location::CenterLeft => (0, middle_y),
            Location::CenterRight => (right, middle_y),
        }
    }

    /// Returns the lowercase name used on the wire and in config.
    pub fn name(self) -> &'static str {
        match self {
            Location::UpperLeft => "upperleft",
            Location::UpperRight => "upperright",
            Location::LowerLeft => "lowerleft",
            Location::LowerRight => "lowerright",
            Location::Center => "center",
            Location::CenterLeft => "centerleft",
            Location::CenterRight => "centerright",
        }
    }

    /// Returns all locations.
    pub fn all() -> &'static [Location] {
        &[
            Location::UpperLeft,
            Location::UpperRight,
            Location::LowerLeft,
            Location::LowerRight,
            Location::Center,
            Location::CenterLeft,
            Location::CenterRight,
        ]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Location {
    type Err = ScreenError;

    /// Parses a location name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Location::all()
            .iter()
            .copied()
            .find(|location| location.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ScreenError::InvalidLocation(s.to_string()))
    }
}
