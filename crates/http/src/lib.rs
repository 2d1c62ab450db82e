//! An embeddable HTTP/1.1 application server built around pooled buffers and a
//! byte-at-a-time request parser.
//!
//! Request bytes are read straight into fixed-size blocks borrowed from a shared
//! [`BufferPool`](buffer::BufferPool). The [`RequestParser`](codec::RequestParser)
//! consumes them one byte at a time, so reads may be split anywhere, and records
//! where things are instead of copying them: file uploads of a `multipart/form-data`
//! body are byte ranges into the block chain, and chunked transfer framing stays
//! in the blocks but is hidden behind gaps of the request's
//! [`InputStreamView`](stream::InputStreamView).
//!
//! # Example
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
//!         .dispatcher(dispatcher_fn(|request: &Request, response: &mut Response| -> Result<(), DispatchError> {
//!             response.set_content_type("text/plain");
//!             write!(response, "Hello {}!\r\n", request.parameter("name").unwrap_or("World"))?;
//!             Ok(())
//!         }))
//!         .with_logging(Level::INFO)
//!         .build()?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: block pool, move-only block handles and block chains
//! - [`stream`]: gap-aware input view over a chain, output view writing into blocks
//! - [`codec`]: request parser, chunked decoder, response encoder, percent-encoding
//! - [`protocol`]: request, response, stock responses and error types
//! - [`connection`]: sans-io protocol handler and the tokio connection driving it
//! - [`handler`]: the [`Dispatcher`](handler::Dispatcher) execution boundary
//! - [`server`]: TCP listener spawning one connection task per socket
//! - [`config`]: limits and pool sizing, deserializable with serde
//!
//! # Error Handling
//!
//! Parse failures are not errors in the Rust sense: the parser finishes with
//! [`Action::Done`](codec::Action::Done) carrying the status to answer with, and the
//! connection sends a stock response. Allocation, I/O and dispatch failures are
//! [`protocol::HttpError`]; dispatch and allocation failures are answered with `500`.
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - One exchange per connection, no keep-alive
//! - No TLS support (use a reverse proxy for HTTPS)

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod stream;

mod utils;
pub(crate) use utils::ensure;
