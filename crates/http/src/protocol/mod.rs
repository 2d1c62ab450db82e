//! Request and response types exchanged between the parser, the connection and
//! the dispatcher, plus the error types of the crate.
//!
//! - [`Request`]: populated by the parser, backed by the request's buffer chain
//! - [`Response`]: filled by the dispatcher, body written into pool blocks
//! - [`StockResponse`]: canned HTML page for error statuses

mod error;
pub use error::AllocError;
pub use error::ConfigError;
pub use error::DecodeError;
pub use error::DispatchError;
pub use error::HttpError;

mod request;
pub use request::Parameters;
pub use request::Part;
pub use request::Request;

mod response;
pub(crate) use response::Outbound;
pub use response::Response;

mod stock;
pub use stock::StockResponse;
