//! The response a dispatcher fills in.
//!
//! Status and headers live in an `http::HeaderMap`; the body is written through an
//! [`OutputStreamView`] so response bytes land in pool blocks like request bytes do.
//!
//! A response served by a connection streams: as soon as the first body block is
//! sealed the head is committed and sent, and every later block follows it while the
//! dispatcher keeps writing. Status and header changes after the commit are ignored.
//! A response that never fills a block is sent in one go with a `Content-Length`.

use std::io;

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

use crate::buffer::{BufferHandle, BufferPool};
use crate::codec::ResponseEncoder;
use crate::stream::OutputStreamView;

/// Bytes a streaming response hands to its connection, in write order.
#[derive(Debug)]
pub(crate) enum Outbound {
    Head(BytesMut),
    Block(BufferHandle),
}

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<String>,
    body: OutputStreamView,
    sink: Option<UnboundedSender<Outbound>>,
    committed: bool,
}

impl Response {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type: None,
            body: OutputStreamView::new(pool),
            sink: None,
            committed: false,
        }
    }

    /// A response whose sealed blocks go to `sink` as they fill.
    pub(crate) fn streaming(pool: BufferPool, sink: UnboundedSender<Outbound>) -> Self {
        Self { sink: Some(sink), ..Self::new(pool) }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.ignore_after_commit("status") {
            return;
        }
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers to edit. Edits made after the head was committed are not sent.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Appends a header value, keeping earlier values of the same name.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.ignore_after_commit("header") {
            return;
        }
        self.headers.append(name, value);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type<S: Into<String>>(&mut self, content_type: S) {
        if self.ignore_after_commit("content type") {
            return;
        }
        self.content_type = Some(content_type.into());
    }

    /// Bytes written to the body so far.
    pub fn content_length(&self) -> usize {
        self.body.written()
    }

    /// The head was sent already.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn body(&self) -> &OutputStreamView {
        &self.body
    }

    pub fn into_body(self) -> OutputStreamView {
        self.body
    }

    /// Writes all of `buf`, waiting for pool blocks without blocking the thread.
    ///
    /// On a connection the wait lets already sealed blocks reach the client, so a
    /// body may be larger than the whole pool.
    ///
    /// # Errors
    ///
    /// Fails when the pool stays exhausted or the connection went away.
    pub async fn write_all_async(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.body.reserve().await?;
            let len = self.body.fill(buf);
            buf = &buf[len..];
            self.publish()?;
        }
        Ok(())
    }

    /// Sends sealed blocks to the connection, committing the head first.
    fn publish(&mut self) -> io::Result<()> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };
        let blocks = self.body.take_completed();
        if blocks.is_empty() {
            return Ok(());
        }

        if !self.committed {
            let mut head = BytesMut::new();
            ResponseEncoder::new().encode_streaming_head(self, &mut head)?;
            trace!(status = %self.status, "response committed");
            sink.send(Outbound::Head(head)).map_err(|_closed| closed())?;
            self.committed = true;
        }
        for block in blocks {
            sink.send(Outbound::Block(block)).map_err(|_closed| closed())?;
        }
        Ok(())
    }

    fn ignore_after_commit(&self, what: &str) -> bool {
        if self.committed {
            warn!(what, "response already committed, change ignored");
        }
        self.committed
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection no longer takes response blocks")
}

/// Writing to a response appends to its body.
impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.body.write(buf)?;
        self.publish()?;
        Ok(len)
    }

    /// Seals the partial block. On a connection this commits the head and sends
    /// everything written so far.
    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()?;
        self.publish()
    }
}
