//! Point-in-time copies of the screen, and their line framing across the
//! process boundary.

use std::collections::BTreeMap;
use std::collections::btree_map;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::buffer::RenderedBuffer;
use crate::location::Location;

/// Rendered text per bound location.
///
/// Owns its strings, so it never aliases live buffer state. Compared by value:
/// two snapshots with the same text and fonts at the same locations are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderSnapshot {
    entries: BTreeMap<Location, RenderedBuffer>,
}

impl RenderSnapshot {
    pub fn new(entries: BTreeMap<Location, RenderedBuffer>) -> Self {
        Self { entries }
    }

    pub fn get(&self, location: Location) -> Option<&RenderedBuffer> {
        self.entries.get(&location)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Location, RenderedBuffer> {
        self.entries.iter()
    }

    /// Encodes the snapshot as one JSON line, newline included.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).context("serialize render snapshot")?;
        line.push('\n');
        Ok(line)
    }

    /// Decodes one line produced by [`RenderSnapshot::encode_line`].
    ///
    /// # Errors
    /// Returns an error if the line is not a snapshot.
    pub fn decode_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim_end()).context("parse render snapshot")
    }
}

impl<'a> IntoIterator for &'a RenderSnapshot {
    type Item = (&'a Location, &'a RenderedBuffer);
    type IntoIter = btree_map::Iter<'a, Location, RenderedBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
