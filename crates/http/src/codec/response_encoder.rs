//! Serializes a [`Response`] head.
//!
//! The status line comes first, then `Content-Length` and `Content-Type`, then every
//! other header once per stored value. Connections serve a single exchange, so
//! `Connection: close` always ends the head. Body blocks are written after the head
//! without passing through here.
//!
//! A head sent while the body is still being written has no `Content-Length`; the
//! body then ends when the connection closes.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};

use crate::protocol::{Response, StockResponse};

/// Initial buffer size allocated for head serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Interim response sent to clients waiting on `Expect: 100-continue`.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, Default, Copy, Clone)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Writes the head of `response` into `dst`.
    ///
    /// # Errors
    ///
    /// Formatting into memory does not fail in practice; the error only carries the
    /// `io::Write` signature through.
    pub fn encode_head(&self, response: &Response, dst: &mut BytesMut) -> io::Result<()> {
        write_head(response, Some(response.content_length()), dst)
    }

    /// Writes the head of a response whose body is still being written.
    ///
    /// # Errors
    ///
    /// Same as [`encode_head`](Self::encode_head).
    pub fn encode_streaming_head(&self, response: &Response, dst: &mut BytesMut) -> io::Result<()> {
        write_head(response, None, dst)
    }

    /// Writes a complete stock response, head and HTML body, into `dst`.
    ///
    /// No pool block is involved, so this still works when the pool is exhausted.
    pub fn encode_stock(&self, stock: StockResponse, dst: &mut BytesMut) -> io::Result<()> {
        let html = stock.html();
        dst.reserve(INIT_HEADER_SIZE + html.len());

        let status = stock.status();
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or("Unknown"))?;
        write!(FastWrite(dst), "Content-Length: {}\r\n", html.len())?;
        dst.put_slice(b"Content-Type: text/html\r\nConnection: close\r\n\r\n");
        dst.put_slice(html.as_bytes());
        Ok(())
    }
}

fn write_head(response: &Response, content_length: Option<usize>, dst: &mut BytesMut) -> io::Result<()> {
    dst.reserve(INIT_HEADER_SIZE);

    let status = response.status();
    write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or("Unknown"))?;
    if let Some(content_length) = content_length {
        write!(FastWrite(dst), "Content-Length: {content_length}\r\n")?;
    }

    let content_type = response
        .content_type()
        .map(str::as_bytes)
        .or_else(|| response.headers().get(CONTENT_TYPE).map(|value| value.as_bytes()));
    if let Some(content_type) = content_type {
        dst.put_slice(b"Content-Type: ");
        dst.put_slice(content_type);
        dst.put_slice(b"\r\n");
    }

    for (name, value) in response.headers() {
        if name == CONTENT_LENGTH || name == CONTENT_TYPE || name == CONNECTION {
            continue;
        }
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }

    dst.put_slice(b"Connection: close\r\n\r\n");
    Ok(())
}

/// Writes straight into a `BytesMut` that already reserved room.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
