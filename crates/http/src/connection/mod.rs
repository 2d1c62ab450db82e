//! HTTP connection handling module
//!
//! - [`ProtocolHandler`]: sans-io glue between reads and the request parser. It
//!   decides when a fresh pool block is needed, switches to chunked decoding after
//!   the head and reports what the transport must do next as an [`Event`].
//! - [`HttpConnection`]: drives a `ProtocolHandler` over tokio I/O, calls the
//!   [`Dispatcher`](crate::handler::Dispatcher) and writes the response or a stock
//!   response back.
//!
//! Each connection serves one exchange and is then closed.

mod http_connection;
mod protocol_handler;

pub use http_connection::HttpConnection;
pub use protocol_handler::Event;
pub use protocol_handler::ProtocolHandler;
