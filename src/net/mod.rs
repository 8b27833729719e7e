//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (Connection capability, lifecycle tracking)
//!     → Hand off to an inbound handler
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Destinations are plain data (address.rs); resolution happens at dial time

pub mod address;
pub mod connection;
pub mod listener;

pub use address::{Address, Destination, Network};
pub use connection::{Connection, ConnectionTracker};
