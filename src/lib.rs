//! Concurrency and data-relay core for proxy inbound handlers.
//!
//! # Layers
//! ```text
//!  inbound::door ──▶ relay ──▶ task (parallel / sequential / continuations)
//!        │             │  └──▶ signal (idle-activity timer)
//!        │             └─────▶ buf (copy loops) ──▶ pipe
//!        └──▶ routing::Dispatcher ──▶ Link { pipe reader, pipe writer }
//! ```
//! Cross-cutting: `config`, `observability`, `lifecycle`, `error`.

// Core
pub mod buf;
pub mod pipe;
pub mod relay;
pub mod signal;
pub mod task;

// Flow plumbing
pub mod inbound;
pub mod net;
pub mod policy;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use inbound::Door;
pub use lifecycle::Shutdown;
pub use relay::relay;
pub use routing::{DirectDispatcher, Dispatcher, Link};
