//! Inbound handlers: turn an accepted client connection into a relayed flow.
//!
//! # Data Flow
//! ```text
//! accepted Connection
//!     → inbound handler (resolve destination, pick policy)
//!     → Dispatcher::dispatch → Link
//!     → relay::relay(client halves, Link)
//! ```

pub mod door;

pub use door::{Door, ResponseWriterFactory};
