//! Request decoding and response encoding.
//!
//! - [`RequestParser`]: byte-at-a-time request automaton producing a
//!   [`Request`](crate::protocol::Request)
//! - [`ChunkedTransferDecoder`]: strips chunked framing in front of a parser
//! - [`ResponseEncoder`]: writes the head of a [`Response`](crate::protocol::Response)
//! - [`encode_url`] / [`decode_url`] / [`decode_path`]: percent-encoding helpers
//!
//! ```
//! use micro_servlet::codec::{Action, RequestParser};
//! use micro_servlet::config::ServerConfig;
//! use http::StatusCode;
//!
//! let mut parser = RequestParser::new(&ServerConfig::default());
//! let (action, _) = parser.parse(b"GET /a?x=1 HTTP/1.1\r\nHost: h\r\n\r\n");
//!
//! assert_eq!(action, Action::Done(StatusCode::OK));
//! assert_eq!(parser.request().path(), "/a");
//! assert_eq!(parser.request().parameter("x"), Some("1"));
//! ```

mod chunked_decoder;
mod parser;
mod response_encoder;
mod url;

pub use chunked_decoder::ChunkedTransferDecoder;
pub use parser::Action;
pub use parser::RequestParser;
pub(crate) use parser::is_success;
pub use response_encoder::CONTINUE_RESPONSE;
pub use response_encoder::ResponseEncoder;
pub use url::decode_path;
pub use url::decode_url;
pub use url::encode_url;
