//! Bidirectional relay between a client connection and a dispatched link.
//!
//! # Responsibilities
//! - Run the request and response copy loops concurrently
//! - Drive the idle timer through the connection phases
//! - Tear both link ends down with the first failure
//!
//! # State Machine
//! ```text
//! Handshake → ConnectionIdle ─┬─ request done ──▶ DownlinkOnly ─┐
//!                             └─ response done ─▶ UplinkOnly ───┴─▶ Closed
//! ```
//! `Closed` is reached when both loops finish, when the idle timer cancels
//! the relay token, or when either loop fails.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::buf::Copier;
use crate::error::{Direction, Error, Result};
use crate::observability::metrics;
use crate::policy::{SessionPolicy, Timeouts};
use crate::routing::Link;
use crate::signal::ActivityTimer;
use crate::task::{self, Task};

/// Stage of one connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshake,
    ConnectionIdle,
    UplinkOnly,
    DownlinkOnly,
    Closed,
}

impl Phase {
    /// Inactivity allowed while in this phase.
    pub fn timeout(self, timeouts: &Timeouts) -> Duration {
        match self {
            Phase::Handshake => timeouts.handshake,
            Phase::ConnectionIdle => timeouts.connection_idle,
            Phase::UplinkOnly => timeouts.uplink_only,
            Phase::DownlinkOnly => timeouts.downlink_only,
            Phase::Closed => Duration::ZERO,
        }
    }
}

/// Bound a protocol handshake by the handshake timeout.
pub async fn handshake<F, T>(timeouts: &Timeouts, handshake: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(Phase::Handshake.timeout(timeouts), handshake)
        .await
        .map_err(|_| Error::HandshakeTimeout)?
}

/// Relay bytes between the client halves and `link` until both directions finish.
///
/// On success the link writer has been closed gracefully. On failure both link
/// ends are closed with the failure and `Error::ConnectionEnds` is returned.
pub async fn relay<R, W>(
    parent: &CancellationToken,
    policy: &SessionPolicy,
    link: Link,
    mut client_reader: R,
    mut client_writer: W,
) -> Result<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let token = parent.child_token();
    let timeouts = policy.timeouts;
    let timer = ActivityTimer::start(token.clone(), Phase::ConnectionIdle.timeout(&timeouts));
    let uplink_bytes = Arc::new(AtomicU64::new(0));
    let downlink_bytes = Arc::new(AtomicU64::new(0));
    let Link {
        reader: link_reader,
        writer: link_writer,
    } = link;

    let request_done = {
        let token = token.clone();
        let timer = timer.clone();
        let writer = link_writer.clone();
        let counter = uplink_bytes.clone();
        let chunk_size = policy.buffer.chunk_size();
        Task::new(async move {
            let result = Copier::new(&token)
                .activity(&timer)
                .counter(&counter)
                .chunk_size(chunk_size)
                .stream_to_pipe(&mut client_reader, &writer)
                .await;
            timer.set_timeout(Phase::DownlinkOnly.timeout(&timeouts));
            result.map_err(|e| Error::transport(Direction::Uplink, e))
        })
    };

    let response_done = {
        let token = token.clone();
        let timer = timer.clone();
        let reader = link_reader.clone();
        let counter = downlink_bytes.clone();
        Task::new(async move {
            let result = Copier::new(&token)
                .activity(&timer)
                .counter(&counter)
                .pipe_to_stream(&reader, &mut client_writer)
                .await;
            timer.set_timeout(Phase::UplinkOnly.timeout(&timeouts));
            result.map_err(|e| Error::transport(Direction::Downlink, e))
        })
    };

    let active = metrics::relay_started();
    let result = task::run([
        task::with_context(token.clone()),
        task::parallel([
            task::single(request_done, [task::on_success(task::close(link_writer.clone()))]),
            response_done,
        ]),
    ])
    .await;
    // Stops the timer and releases loops still parked on I/O.
    token.cancel();

    let uplink = uplink_bytes.load(Ordering::Relaxed);
    let downlink = downlink_bytes.load(Ordering::Relaxed);
    metrics::relay_finished(result.is_ok(), uplink, downlink);
    drop(active);

    match result {
        Ok(()) => {
            tracing::debug!(uplink_bytes = uplink, downlink_bytes = downlink, "Relay finished");
            Ok(())
        }
        Err(err) => {
            tracing::debug!(
                uplink_bytes = uplink,
                downlink_bytes = downlink,
                error = %err,
                "Relay failed"
            );
            link_reader.close_error(err.clone());
            link_writer.close_error(err.clone());
            Err(Error::ConnectionEnds(Box::new(err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe;
    use crate::policy::BufferPolicy;
    use tokio::io::AsyncReadExt;

    fn short_policy() -> SessionPolicy {
        SessionPolicy {
            timeouts: Timeouts {
                handshake: Duration::from_millis(100),
                connection_idle: Duration::from_millis(200),
                uplink_only: Duration::from_millis(200),
                downlink_only: Duration::from_millis(200),
            },
            buffer: BufferPolicy {
                per_connection: 4096,
            },
        }
    }

    #[test]
    fn phase_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(Phase::ConnectionIdle.timeout(&timeouts), Duration::from_secs(300));
        assert_eq!(Phase::DownlinkOnly.timeout(&timeouts), Duration::from_secs(1));
        assert_eq!(Phase::Closed.timeout(&timeouts), Duration::ZERO);
    }

    #[tokio::test]
    async fn handshake_times_out() {
        let timeouts = short_policy().timeouts;
        let result: Result<()> = handshake(&timeouts, std::future::pending()).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout)));

        let value = handshake(&timeouts, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_exchange_closes_link_writer() {
        let (link_writer, far_reader) = pipe::new(1024);
        let (far_writer, link_reader) = pipe::new(1024);
        far_writer.close();

        let (client, proxy_side) = tokio::io::duplex(1024);
        let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
        drop(client);

        let token = CancellationToken::new();
        let link = Link {
            reader: link_reader,
            writer: link_writer,
        };
        relay(&token, &short_policy(), link, proxy_read, proxy_write)
            .await
            .unwrap();

        assert!(far_reader.read().await.unwrap().is_none());
        assert!(far_reader.close_reason().is_none());
        assert!(!token.is_cancelled(), "the parent token is never cancelled by the relay");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parent_cancellation_ends_relay() {
        let (link_writer, _far_reader) = pipe::new(1024);
        let (_far_writer, link_reader) = pipe::new(1024);
        let (mut client, proxy_side) = tokio::io::duplex(1024);
        let (proxy_read, proxy_write) = tokio::io::split(proxy_side);

        let token = CancellationToken::new();
        let mut policy = short_policy();
        policy.timeouts.connection_idle = Duration::from_secs(60);

        let handle = {
            let token = token.clone();
            tokio::spawn(async move {
                let link = Link {
                    reader: link_reader,
                    writer: link_writer,
                };
                relay(&token, &policy, link, proxy_read, proxy_write).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, Error::ConnectionEnds(_)));
        assert!(err.is_cancelled());

        // The client half was released, so the client sees EOF.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
