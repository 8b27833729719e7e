//! Forwarding inbound ("door"): every connection goes to one destination.
//!
//! The destination is fixed by configuration. With `follow_redirect`, the
//! address the connection announced during its handshake replaces the
//! configured one.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::config::DoorConfig;
use crate::error::{Direction, Error, Result};
use crate::net::address::{Address, Destination, Network};
use crate::net::connection::Connection;
use crate::policy::{PolicyProvider, SessionPolicy};
use crate::relay;
use crate::routing::{Dispatcher, Link};

/// Boxed writer the response direction is copied into.
pub type ResponseWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens the writer for UDP responses when redirects are followed.
///
/// Responses must then appear to come from the redirected destination, which
/// needs a socket other than the accepted one.
pub trait ResponseWriterFactory: Send + Sync {
    fn open<'a>(
        &'a self,
        source: &'a Destination,
        client: Option<SocketAddr>,
    ) -> BoxFuture<'a, io::Result<ResponseWriter>>;
}

pub struct Door {
    config: DoorConfig,
    address: Option<Address>,
    policies: Arc<dyn PolicyProvider>,
    writer_factory: Option<Arc<dyn ResponseWriterFactory>>,
}

impl std::fmt::Debug for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Door")
            .field("config", &self.config)
            .field("address", &self.address)
            .field("writer_factory", &self.writer_factory.is_some())
            .finish()
    }
}

impl Door {
    pub fn new(config: DoorConfig, policies: Arc<dyn PolicyProvider>) -> Result<Self> {
        if config.networks.is_empty() {
            return Err(Error::Config("no network specified".to_string()));
        }
        let address = config.address.as_deref().and_then(Address::parse);
        Ok(Self {
            config,
            address,
            policies,
            writer_factory: None,
        })
    }

    pub fn with_writer_factory(mut self, factory: Arc<dyn ResponseWriterFactory>) -> Self {
        self.writer_factory = Some(factory);
        self
    }

    /// Networks this inbound accepts.
    pub fn networks(&self) -> &[Network] {
        &self.config.networks
    }

    /// Session policy for the configured user level.
    ///
    /// A configured timeout replaces the idle timeout of level 0 only.
    pub fn policy(&self) -> SessionPolicy {
        let mut policy = self.policies.for_level(self.config.user_level);
        if self.config.timeout_secs > 0 && self.config.user_level == 0 {
            policy.timeouts.connection_idle = Duration::from_secs(self.config.timeout_secs);
        }
        policy
    }

    /// Destination for a connection on `network`.
    pub fn destination<C: Connection>(&self, network: Network, conn: &C) -> Result<Destination> {
        let mut address = self.address.clone();
        if self.config.follow_redirect {
            if let Some(announced) = conn.handshake_address() {
                address = Some(announced);
            }
        }

        let destination = Destination {
            network,
            address: address.ok_or(Error::NoDestination)?,
            port: self.config.port,
        };
        if !destination.is_valid() {
            return Err(Error::NoDestination);
        }
        Ok(destination)
    }

    /// Relay `conn` to the configured destination through `dispatcher`.
    pub async fn process<C: Connection>(
        &self,
        token: &CancellationToken,
        network: Network,
        conn: C,
        dispatcher: &dyn Dispatcher,
    ) -> Result<()> {
        let client = conn.remote_addr();
        tracing::debug!(client = ?client, network = %network, "Processing connection");

        let destination = self.destination(network, &conn)?;
        let policy = self.policy();

        let link = dispatcher.dispatch(token, destination.clone()).await?;
        let (client_reader, client_writer) = tokio::io::split(conn);

        let response_writer: ResponseWriter =
            if network == Network::Udp && self.config.follow_redirect {
                match self.open_redirect_writer(&destination, client).await {
                    Ok(writer) => writer,
                    Err(err) => {
                        let err = Error::transport(Direction::Downlink, err);
                        close_link(&link, &err);
                        return Err(Error::ConnectionEnds(Box::new(err)));
                    }
                }
            } else {
                Box::new(client_writer)
            };

        relay::relay(token, &policy, link, client_reader, response_writer).await
    }

    async fn open_redirect_writer(
        &self,
        destination: &Destination,
        client: Option<SocketAddr>,
    ) -> Result<ResponseWriter> {
        let factory = self.writer_factory.as_ref().ok_or_else(|| {
            Error::Config("follow_redirect over udp needs a response writer factory".to_string())
        })?;
        Ok(factory.open(destination, client).await?)
    }
}

fn close_link(link: &Link, err: &Error) {
    link.reader.close_error(err.clone());
    link.writer.close_error(err.clone());
}
