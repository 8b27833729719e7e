//! Copy loops between client streams and link pipes.
//!
//! # Responsibilities
//! - Move bytes chunk by chunk, reporting every chunk as activity
//! - Stop promptly when the owning token is cancelled
//! - Count transferred bytes
//!
//! # Design Decisions
//! - Reading a stream and writing a pipe are separate suspension points, both
//!   raced against the token so a parked loop releases its stream half.
//! - A pipe EOF is forwarded as a stream shutdown (half-close).

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::pipe::{PipeReader, PipeWriter};
use crate::signal::{ActivityUpdater, NoActivity};

const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

static NO_ACTIVITY: NoActivity = NoActivity;

/// Options for one copy loop.
pub struct Copier<'a> {
    token: &'a CancellationToken,
    activity: &'a dyn ActivityUpdater,
    transferred: Option<&'a AtomicU64>,
    chunk_size: usize,
}

impl<'a> Copier<'a> {
    pub fn new(token: &'a CancellationToken) -> Self {
        Self {
            token,
            activity: &NO_ACTIVITY,
            transferred: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Report every chunk to `activity`.
    pub fn activity(mut self, activity: &'a dyn ActivityUpdater) -> Self {
        self.activity = activity;
        self
    }

    /// Add every chunk's length to `counter`.
    pub fn counter(mut self, counter: &'a AtomicU64) -> Self {
        self.transferred = Some(counter);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn record(&self, n: usize) {
        self.activity.update();
        if let Some(counter) = self.transferred {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    /// Copy `reader` into `writer` until EOF. The pipe is left open.
    pub async fn stream_to_pipe<R>(&self, reader: &mut R, writer: &PipeWriter) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        loop {
            buf.reserve(self.chunk_size);
            let n = self
                .token
                .run_until_cancelled(reader.read_buf(&mut buf))
                .await
                .ok_or(Error::Cancelled)??;
            if n == 0 {
                return Ok(());
            }

            let chunk = buf.split().freeze();
            self.token
                .run_until_cancelled(writer.write(chunk))
                .await
                .ok_or(Error::Cancelled)??;
            self.record(n);
        }
    }

    /// Copy `reader` into `writer` until the pipe ends, then shut `writer` down.
    pub async fn pipe_to_stream<W>(&self, reader: &PipeReader, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let next = self
                .token
                .run_until_cancelled(reader.read())
                .await
                .ok_or(Error::Cancelled)??;
            let Some(chunk) = next else {
                writer.shutdown().await?;
                return Ok(());
            };

            self.token
                .run_until_cancelled(async {
                    writer.write_all(&chunk).await?;
                    writer.flush().await
                })
                .await
                .ok_or(Error::Cancelled)??;
            self.record(chunk.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingActivity(AtomicUsize);

    impl ActivityUpdater for CountingActivity {
        fn update(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn stream_to_pipe_reports_each_chunk() {
        let token = CancellationToken::new();
        let activity = CountingActivity(AtomicUsize::new(0));
        let counter = AtomicU64::new(0);
        let (writer, reader) = pipe::new(1024);

        let mut source: &[u8] = b"Request";
        Copier::new(&token)
            .activity(&activity)
            .counter(&counter)
            .chunk_size(4)
            .stream_to_pipe(&mut source, &writer)
            .await
            .unwrap();
        writer.close();

        let mut received = Vec::new();
        while let Some(chunk) = reader.read().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"Request");
        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert!(activity.0.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn pipe_to_stream_shuts_down_on_eof() {
        let token = CancellationToken::new();
        let (writer, reader) = pipe::new(1024);
        writer.write(Bytes::from_static(b"Response")).await.unwrap();
        writer.close();

        let (mut near, mut far) = tokio::io::duplex(64);
        Copier::new(&token)
            .pipe_to_stream(&reader, &mut near)
            .await
            .unwrap();

        let mut out = Vec::new();
        far.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Response");
    }

    #[tokio::test]
    async fn cancellation_releases_parked_reader() {
        let token = CancellationToken::new();
        let (writer, _reader) = pipe::new(1024);
        let (mut near, _far) = tokio::io::duplex(64);

        let handle = {
            let token = token.clone();
            tokio::spawn(async move {
                Copier::new(&token).stream_to_pipe(&mut near, &writer).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn pipe_error_surfaces() {
        let token = CancellationToken::new();
        let (_writer, reader) = pipe::new(1024);
        reader.close_error(Error::PipeClosed);

        let (mut near, _far) = tokio::io::duplex(64);
        let result = Copier::new(&token).pipe_to_stream(&reader, &mut near).await;
        assert!(matches!(result, Err(Error::PipeClosed)));
    }
}
