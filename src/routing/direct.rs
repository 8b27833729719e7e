//! Dispatcher that dials TCP destinations directly.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{Dispatcher, Link};
use crate::buf::Copier;
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::net::address::{Destination, Network};
use crate::pipe::{self, PipeReader, PipeWriter};
use crate::policy::BufferPolicy;
use crate::task::{self, Task};

#[derive(Debug, Clone)]
pub struct DirectDispatcher {
    connect_timeout: Duration,
    buffer: BufferPolicy,
}

impl DirectDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            buffer: BufferPolicy::default(),
        }
    }

    pub fn with_buffer(mut self, buffer: BufferPolicy) -> Self {
        self.buffer = buffer;
        self
    }

    async fn connect(&self, token: &CancellationToken, destination: &Destination) -> Result<TcpStream> {
        let connect = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(destination.authority()),
        );
        match token.run_until_cancelled(connect).await {
            None => Err(Error::Cancelled),
            Some(Err(_)) => Err(Error::Dispatch {
                destination: destination.clone(),
                reason: format!("connect timed out after {:?}", self.connect_timeout),
            }),
            Some(Ok(Err(e))) => Err(Error::Dispatch {
                destination: destination.clone(),
                reason: e.to_string(),
            }),
            Some(Ok(Ok(stream))) => Ok(stream),
        }
    }
}

impl Dispatcher for DirectDispatcher {
    fn dispatch<'a>(
        &'a self,
        token: &'a CancellationToken,
        destination: Destination,
    ) -> BoxFuture<'a, Result<Link>> {
        Box::pin(async move {
            if destination.network != Network::Tcp {
                return Err(Error::Dispatch {
                    destination,
                    reason: "only tcp destinations can be dialed".to_string(),
                });
            }

            let stream = self.connect(token, &destination).await?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
            tracing::debug!(destination = %destination, "Destination connected");

            let (request_writer, request_reader) = pipe::new(self.buffer.per_connection);
            let (response_writer, response_reader) = pipe::new(self.buffer.per_connection);

            tokio::spawn(pump(
                token.child_token(),
                stream,
                request_reader,
                response_writer,
                self.buffer.chunk_size(),
                destination,
            ));

            Ok(Link {
                reader: response_reader,
                writer: request_writer,
            })
        })
    }
}

/// Move requests to the socket and responses back until both sides finish.
async fn pump(
    token: CancellationToken,
    stream: TcpStream,
    requests: PipeReader,
    responses: PipeWriter,
    chunk_size: usize,
    destination: Destination,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    let outbound = {
        let token = token.clone();
        let requests = requests.clone();
        Task::new(async move {
            Copier::new(&token)
                .pipe_to_stream(&requests, &mut write_half)
                .await
        })
    };

    let inbound = {
        let token = token.clone();
        let responses = responses.clone();
        Task::new(async move {
            Copier::new(&token)
                .chunk_size(chunk_size)
                .stream_to_pipe(&mut read_half, &responses)
                .await
        })
    };

    let result = task::run([
        task::with_context(token.clone()),
        task::parallel([
            outbound,
            task::single(inbound, [task::on_success(task::close(responses.clone()))]),
        ]),
    ])
    .await;
    token.cancel();

    match result {
        Ok(()) => tracing::debug!(destination = %destination, "Destination flow finished"),
        Err(err) => {
            tracing::debug!(destination = %destination, error = %err, "Destination flow failed");
            requests.close_error(err.clone());
            responses.close_error(err);
        }
    }
}
