//! TCP front end: accepts sockets and runs one [`HttpConnection`] per socket.
//!
//! ```no_run
//! use micro_servlet::handler::dispatcher_fn;
//! use micro_servlet::protocol::{DispatchError, Request, Response};
//! use micro_servlet::server::Server;
//! use std::io::Write;
//! use tracing::Level;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .address("127.0.0.1:8080")
//!         .dispatcher(dispatcher_fn(|_: &Request, response: &mut Response| -> Result<(), DispatchError> {
//!             response.set_content_type("text/plain");
//!             response.write_all(b"Hello World!\r\n")?;
//!             Ok(())
//!         }))
//!         .with_logging(Level::INFO)
//!         .build()?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::buffer::BufferPool;
use crate::config::ServerConfig;
use crate::connection::HttpConnection;
use crate::handler::Dispatcher;
use crate::protocol::ConfigError;

pub struct ServerBuilder {
    address: Option<io::Result<Vec<SocketAddr>>>,
    config: ServerConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    log_level: Option<Level>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, config: ServerConfig::default(), dispatcher: None, log_level: None }
    }

    #[must_use]
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Installs a global `tracing` subscriber with this max level on start.
    #[must_use]
    pub fn with_logging(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// # Errors
    ///
    /// Fails when the address or the dispatcher is missing, the address does not
    /// resolve, or the configuration is invalid.
    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(ServerBuildError::address)?;
        if address.is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }
        let dispatcher = self.dispatcher.ok_or(ServerBuildError::MissingDispatcher)?;
        self.config.validate()?;

        let pool = BufferPool::new(&self.config.pool);
        Ok(Server { address, config: self.config, pool, dispatcher, log_level: self.log_level })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("has_dispatcher", &self.dispatcher.is_some())
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
    #[error("dispatcher must be set")]
    MissingDispatcher,
    #[error("can't resolve address: {source}")]
    InvalidAddress { source: io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServerBuildError {
    fn address(source: io::Error) -> Self {
        Self::InvalidAddress { source }
    }
}

pub struct Server {
    address: Vec<SocketAddr>,
    config: ServerConfig,
    pool: BufferPool,
    dispatcher: Arc<dyn Dispatcher>,
    log_level: Option<Level>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The pool shared by all connections of this server.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Binds the configured address and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Fails when the address can't be bound.
    pub async fn start(self) -> io::Result<()> {
        if let Some(level) = self.log_level {
            let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
            if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                warn!(cause = %e, "a global subscriber is already installed");
            }
        }

        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };

        self.serve(tcp_listener).await;
        Ok(())
    }

    /// Accepts connections from an already bound listener, forever.
    pub async fn serve(self, tcp_listener: TcpListener) {
        info!(
            block_size = self.pool.block_size(),
            max_content_length = self.config.maximal_content_length,
            "serving connections"
        );
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let pool = self.pool.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer, pool, &config);
                match connection.process(dispatcher).await {
                    Ok(()) => {
                        info!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!(%remote_addr, "service has error, cause {}, connection shutdown", e);
                    }
                }
            });
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("address", &self.address).field("config", &self.config).finish_non_exhaustive()
    }
}
