//! The registry of buffers and the locations they are bound to.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::buffer::Buffer;
use crate::error::ScreenError;
use crate::location::Location;
use crate::snapshot::RenderSnapshot;

/// Both maps live behind one lock so a buffer and its binding are always
/// added, removed and observed together.
#[derive(Debug, Default)]
struct ScreenState {
    buffers: HashMap<String, Buffer>,
    locations: HashMap<String, Location>,
}

impl ScreenState {
    fn owner_of(&self, location: Location) -> Option<&str> {
        self.locations
            .iter()
            .find(|(_, bound)| **bound == location)
            .map(|(name, _)| name.as_str())
    }

    fn buffer_mut(&mut self, name: &str) -> Result<&mut Buffer, ScreenError> {
        self.buffers
            .get_mut(name)
            .ok_or_else(|| ScreenError::UnregisteredBuffer(name.to_string()))
    }
}

/// Shared display state. Construct once and hand an `Arc<Screen>` to the
/// dispatcher and the ticker.
#[derive(Debug, Default)]
pub struct Screen {
    state: Mutex<ScreenState>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScreenState> {
        // no operation can panic between its two map updates
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `name` at `location`.
    ///
    /// Re-registering an existing name is a no-op: rows, font size and the
    /// original binding are kept even if `location` differs.
    ///
    /// # Errors
    /// Returns [`ScreenError::LocationConflict`] if another buffer holds `location`.
    pub fn register_buffer(
        &self,
        name: &str,
        location: Location,
        font_size: u32,
    ) -> Result<(), ScreenError> {
        let mut state = self.lock();

        if let Some(owner) = state.owner_of(location)
            && owner != name
        {
            return Err(ScreenError::LocationConflict {
                location,
                owner: owner.to_string(),
            });
        }

        if state.buffers.contains_key(name) {
            return Ok(());
        }

        state.buffers.insert(name.to_string(), Buffer::new(font_size));
        state.locations.insert(name.to_string(), location);
        debug!(buffer = name, %location, font_size, "registered buffer");
        Ok(())
    }

    /// Removes a buffer and its binding. Unknown names are ignored.
    pub fn unregister_buffer(&self, name: &str) {
        let mut state = self.lock();
        if state.buffers.remove(name).is_some() {
            state.locations.remove(name);
            debug!(buffer = name, "unregistered buffer");
        }
    }

    /// Sets `row` of buffer `name` to `content`.
    ///
    /// # Errors
    /// Returns [`ScreenError::UnregisteredBuffer`] if `name` is unknown.
    pub fn update_row(&self, name: &str, row: &str, content: &str) -> Result<(), ScreenError> {
        self.lock().buffer_mut(name)?.update_row(row, content);
        Ok(())
    }

    /// Empties the rows of buffer `name`, keeping its binding and font size.
    ///
    /// # Errors
    /// Returns [`ScreenError::UnregisteredBuffer`] if `name` is unknown.
    pub fn clear_buffer(&self, name: &str) -> Result<(), ScreenError> {
        self.lock().buffer_mut(name)?.clear();
        Ok(())
    }

    /// Drops every buffer and binding.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.buffers.clear();
        state.locations.clear();
        debug!("screen reset");
    }

    /// Renders every bound buffer into a snapshot.
    pub fn render(&self) -> RenderSnapshot {
        let state = self.lock();
        let entries: BTreeMap<_, _> = state
            .buffers
            .iter()
            .filter_map(|(name, buffer)| {
                state
                    .locations
                    .get(name)
                    .map(|location| (*location, buffer.render()))
            })
            .collect();
        RenderSnapshot::new(entries)
    }

    /// Returns the location `name` is bound to, if registered.
    #[cfg(test)]
    fn location_of(&self, name: &str) -> Option<Location> {
        self.lock().locations.get(name).copied()
    }
}
