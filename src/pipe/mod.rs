//! Bounded in-memory pipe carrying byte chunks.
//!
//! # Responsibilities
//! - Connect a relay to a dispatched flow without a socket in between
//! - Apply backpressure once `limit` bytes are buffered
//! - Distinguish a graceful end (`close`) from a teardown (`close_error`)
//!
//! # States
//! ```text
//! Open ──close()──────▶ Closed   (reader drains, then sees EOF)
//!   │                     │
//!   └──close_error(e)─────┴──▶ Errored(e)   (buffer dropped, both ends fail with e)
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::task::Closable;

#[derive(Debug, Clone)]
enum Status {
    Open,
    Closed,
    Errored(Error),
}

#[derive(Debug)]
struct State {
    queue: VecDeque<Bytes>,
    buffered: usize,
    status: Status,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Notify,
    limit: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut state = self.lock();
        if matches!(state.status, Status::Open) {
            state.status = Status::Closed;
            drop(state);
            self.changed.notify_waiters();
        }
    }

    fn close_error(&self, err: Error) {
        let mut state = self.lock();
        if matches!(state.status, Status::Errored(_)) {
            return;
        }
        state.status = Status::Errored(err);
        state.queue.clear();
        state.buffered = 0;
        drop(state);
        self.changed.notify_waiters();
    }

    fn close_reason(&self) -> Option<Error> {
        match &self.lock().status {
            Status::Errored(err) => Some(err.clone()),
            _ => None,
        }
    }

    fn is_closed(&self) -> bool {
        !matches!(self.lock().status, Status::Open)
    }
}

/// Create a pipe buffering up to `limit` bytes before writers wait.
pub fn new(limit: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            buffered: 0,
            status: Status::Open,
        }),
        changed: Notify::new(),
        limit: limit.max(1),
    });
    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

/// Write end of a pipe. Clones write into the same pipe.
#[derive(Debug, Clone)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Queue `chunk`, waiting while the buffer is over its limit.
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        loop {
            let changed = self.shared.changed.notified();
            {
                let mut state = self.shared.lock();
                match &state.status {
                    Status::Errored(err) => return Err(err.clone()),
                    Status::Closed => return Err(Error::PipeClosed),
                    Status::Open => {}
                }
                // An oversized chunk still goes through once the buffer is empty.
                if state.buffered < self.shared.limit || state.queue.is_empty() {
                    state.buffered += chunk.len();
                    state.queue.push_back(chunk);
                    drop(state);
                    self.shared.changed.notify_waiters();
                    return Ok(());
                }
            }
            changed.await;
        }
    }

    /// Signal that no more data will be written. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Tear the pipe down with `err` as the recorded reason.
    pub fn close_error(&self, err: Error) {
        self.shared.close_error(err);
    }

    pub fn close_reason(&self) -> Option<Error> {
        self.shared.close_reason()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Closable for PipeWriter {
    fn close(&self) {
        PipeWriter::close(self);
    }
}

/// Read end of a pipe.
#[derive(Debug, Clone)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Next chunk, or `None` once the pipe is closed and drained.
    pub async fn read(&self) -> Result<Option<Bytes>> {
        loop {
            let changed = self.shared.changed.notified();
            {
                let mut state = self.shared.lock();
                if let Status::Errored(err) = &state.status {
                    return Err(err.clone());
                }
                if let Some(chunk) = state.queue.pop_front() {
                    state.buffered -= chunk.len();
                    drop(state);
                    self.shared.changed.notify_waiters();
                    return Ok(Some(chunk));
                }
                if matches!(state.status, Status::Closed) {
                    return Ok(None);
                }
            }
            changed.await;
        }
    }

    /// Tear the pipe down with `err` as the recorded reason.
    pub fn close_error(&self, err: Error) {
        self.shared.close_error(err);
    }

    pub fn close_reason(&self) -> Option<Error> {
        self.shared.close_reason()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}
