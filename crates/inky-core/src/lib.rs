//! Display state for the inky e-ink service.
//!
//! Producers mutate a [`Screen`] through the remote-call surface in [`rpc`].
//! The [`ticker`] snapshots it periodically and hands each [`RenderSnapshot`]
//! to the device process; [`shutdown`] carries the stop signal across.

pub mod buffer;
pub mod config;
pub mod error;
pub mod location;
pub mod nodes;
pub mod rpc;
pub mod screen;
pub mod shutdown;
pub mod snapshot;
pub mod ticker;

pub use buffer::{Buffer, DEFAULT_FONT_SIZE, RenderedBuffer};
pub use error::{ErrorKind, ScreenError};
pub use location::Location;
pub use screen::Screen;
pub use snapshot::RenderSnapshot;
