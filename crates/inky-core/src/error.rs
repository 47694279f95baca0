//! Errors surfaced by the screen registry and the remote-call surface.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Failure of a screen operation. State is left untouched whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenError {
    /// The location name does not match any known anchor.
    InvalidLocation(String),
    /// The location is already bound to another buffer.
    LocationConflict { location: Location, owner: String },
    /// The named buffer is not registered.
    UnregisteredBuffer(String),
}

impl ScreenError {
    /// Returns the wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScreenError::InvalidLocation(_) => ErrorKind::InvalidArgument,
            ScreenError::LocationConflict { .. } => ErrorKind::LocationConflict,
            ScreenError::UnregisteredBuffer(_) => ErrorKind::UnregisteredBuffer,
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenError::InvalidLocation(name) => write!(f, "unknown location '{name}'"),
            ScreenError::LocationConflict { location, owner } => {
                write!(f, "location {location} is already taken by buffer '{owner}'")
            }
            ScreenError::UnregisteredBuffer(name) => {
                write!(f, "buffer '{name}' is not registered")
            }
        }
    }
}

impl std::error::Error for ScreenError {}

/// Error categories carried in remote-call responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown location name
    InvalidArgument,
    /// Location already bound to a different buffer
    LocationConflict,
    /// Buffer name not registered
    UnregisteredBuffer,
    /// Request line could not be decoded
    BadRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid_argument"),
            ErrorKind::LocationConflict => write!(f, "location_conflict"),
            ErrorKind::UnregisteredBuffer => write!(f, "unregistered_buffer"),
            ErrorKind::BadRequest => write!(f, "bad_request"),
        }
    }
}
