//! Dispatching flows to destinations.
//!
//! # Data Flow
//! ```text
//! inbound handler ──dispatch(dest)──▶ Dispatcher ──▶ Link { reader, writer }
//!                                                     │        │
//!               relay writes requests into ───────────┼────────┘
//!               relay reads responses from ───────────┘
//! ```
//!
//! # Design Decisions
//! - A Link is exclusively owned by one relay for its lifetime
//! - The dispatcher holds the opposite pipe ends and feeds the destination

pub mod direct;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::net::address::Destination;
use crate::pipe::{PipeReader, PipeWriter};

pub use direct::DirectDispatcher;

/// One dispatched flow, seen from the inbound side.
#[derive(Debug)]
pub struct Link {
    /// Responses from the destination.
    pub reader: PipeReader,
    /// Requests towards the destination.
    pub writer: PipeWriter,
}

/// Turns a destination into a [`Link`].
pub trait Dispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        token: &'a CancellationToken,
        destination: Destination,
    ) -> BoxFuture<'a, Result<Link>>;
}
