//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use relay_core::pipe::{self, PipeReader, PipeWriter};
use relay_core::policy::{BufferPolicy, SessionPolicy, Timeouts};
use relay_core::Link;

/// Start a destination that reads each request to EOF and answers with `f(request)`.
pub async fn start_programmable_destination<F>(f: F) -> SocketAddr
where
    F: Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                if socket.read_to_end(&mut request).await.is_err() {
                    return;
                }
                let _ = socket.write_all(&f(request)).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a destination that echoes every request back.
pub async fn start_echo_destination() -> SocketAddr {
    start_programmable_destination(|request| request).await
}

/// Far side of an in-memory link: what a dispatcher would hold.
pub struct FarEnd {
    /// Requests written by the relay.
    pub reader: PipeReader,
    /// Responses read by the relay.
    pub writer: PipeWriter,
}

/// A link whose destination side is driven by the test.
pub fn memory_link(limit: usize) -> (Link, FarEnd) {
    let (link_writer, far_reader) = pipe::new(limit);
    let (far_writer, link_reader) = pipe::new(limit);
    (
        Link {
            reader: link_reader,
            writer: link_writer,
        },
        FarEnd {
            reader: far_reader,
            writer: far_writer,
        },
    )
}

/// Read every chunk until the pipe ends.
pub async fn drain(reader: &PipeReader) -> relay_core::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = reader.read().await? {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Policy with timeouts short enough for tests.
pub fn policy(idle: Duration, half_closed: Duration) -> SessionPolicy {
    SessionPolicy {
        timeouts: Timeouts {
            handshake: Duration::from_secs(1),
            connection_idle: idle,
            uplink_only: half_closed,
            downlink_only: half_closed,
        },
        buffer: BufferPolicy {
            per_connection: 16 * 1024,
        },
    }
}
