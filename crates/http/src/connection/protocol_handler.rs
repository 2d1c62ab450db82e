//! Glue between transport reads and the request parser.
//!
//! [`ProtocolHandler`] performs no I/O itself. The transport asks it whether a fresh
//! block is needed, reads into [`ProtocolHandler::read_space`] and reports the byte
//! count through [`ProtocolHandler::handle_read`]. The returned [`Event`] says what
//! the transport must do next.

use std::mem;

use http::StatusCode;
use tracing::{debug, trace};

use crate::buffer::{BufferChain, BufferHandle};
use crate::codec::{Action, ChunkedTransferDecoder, RequestParser, is_success};
use crate::config::ServerConfig;
use crate::protocol::Request;

/// What the transport must do after a read was handled.
#[derive(Debug)]
pub enum Event {
    /// Read more bytes.
    NeedRead,
    /// Write the interim `100 Continue` response, then read more bytes.
    SendContinue,
    /// The request is complete and ready for dispatch.
    Complete(Box<Request>),
    /// The request is rejected. Answer with a stock response for the status and close.
    Reject(StatusCode),
}

#[derive(Debug)]
enum ActiveParser {
    Plain(RequestParser),
    Chunked(ChunkedTransferDecoder),
}

impl ActiveParser {
    fn parse(&mut self, bytes: &[u8]) -> (Action, usize) {
        match self {
            ActiveParser::Plain(parser) => parser.parse(bytes),
            ActiveParser::Chunked(decoder) => decoder.parse(bytes),
        }
    }

    fn inner(&self) -> &RequestParser {
        match self {
            ActiveParser::Plain(parser) => parser,
            ActiveParser::Chunked(decoder) => decoder.inner(),
        }
    }

    fn into_request(self, chain: BufferChain) -> Request {
        match self {
            ActiveParser::Plain(parser) => parser.into_request(chain),
            ActiveParser::Chunked(decoder) => decoder.into_inner().into_request(chain),
        }
    }
}

/// Per-connection parse state: the active parser, the blocks read so far and the
/// block currently being read into.
#[derive(Debug)]
pub struct ProtocolHandler {
    parser: Option<ActiveParser>,
    chain: BufferChain,
    current: BufferHandle,
    read_slack: usize,
    max_content_length: usize,
    continue_pending: bool,
}

impl ProtocolHandler {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            parser: Some(ActiveParser::Plain(RequestParser::new(config))),
            chain: BufferChain::new(),
            current: BufferHandle::vacant(),
            read_slack: config.read_slack,
            max_content_length: config.maximal_content_length,
            continue_pending: false,
        }
    }

    /// Bytes fed to the parser so far.
    pub fn received(&self) -> usize {
        self.parser.as_ref().map_or(0, |parser| parser.inner().index())
    }

    /// Decides where the next read goes. Returns `true` when the caller must
    /// [`attach_buffer`](Self::attach_buffer) a fresh block first.
    ///
    /// A block that holds bytes but has less than the read slack left is moved to
    /// the chain; reads keep going into a block that still has room.
    pub fn prepare_read(&mut self) -> bool {
        if self.current.is_vacant() {
            return true;
        }
        if self.current.marker() > 0 && self.current.remaining() < self.read_slack.max(1) {
            trace!(marker = self.current.marker(), "retire read buffer");
            let full = mem::replace(&mut self.current, BufferHandle::vacant());
            self.chain.push(full);
            return true;
        }
        false
    }

    pub fn attach_buffer(&mut self, handle: BufferHandle) {
        debug_assert!(self.current.is_vacant());
        self.current = handle;
    }

    /// Free space of the current block to read into.
    pub fn read_space(&mut self) -> &mut [u8] {
        self.current.spare_mut()
    }

    /// Feeds the `count` bytes just read into [`read_space`](Self::read_space).
    pub fn handle_read(&mut self, count: usize) -> Event {
        let start = self.current.marker();
        self.current.advance(count);
        let end = self.current.marker();

        let mut offset = start;
        loop {
            let Some(parser) = self.parser.as_mut() else {
                return Event::Reject(StatusCode::INTERNAL_SERVER_ERROR);
            };

            let (action, consumed) = parser.parse(&self.current.filled()[offset..end]);
            offset += consumed;

            match action {
                Action::Continue => return self.need_read(),
                // a new chunk is announced, ask for the next one once this read is used up
                Action::ContinueAction => self.continue_pending = true,
                Action::CheckHeaders => self.check_headers(),
                Action::Done(status) if is_success(status) => return self.complete(),
                Action::Done(status) => {
                    self.discard();
                    return Event::Reject(status);
                }
            }
        }
    }

    /// Drops in-flight state after the peer went away. Blocks go back to the pool.
    pub fn discard(&mut self) {
        if self.received() > 0 {
            debug!(received = self.received(), "discard unfinished request");
        }
        self.parser = None;
        self.chain.clear();
        self.current = BufferHandle::vacant();
    }

    fn check_headers(&mut self) {
        let Some(parser) = self.parser.take() else {
            return;
        };

        let parser = match parser {
            ActiveParser::Plain(parser) if parser.is_chunked() => {
                trace!("switch to chunked transfer decoding");
                ActiveParser::Chunked(ChunkedTransferDecoder::new(parser, self.max_content_length))
            }
            other => other,
        };
        self.continue_pending = parser.inner().expect_continue() || parser.inner().is_chunked();
        self.parser = Some(parser);
    }

    fn need_read(&mut self) -> Event {
        if mem::take(&mut self.continue_pending) {
            return Event::SendContinue;
        }
        Event::NeedRead
    }

    fn complete(&mut self) -> Event {
        let Some(parser) = self.parser.take() else {
            return Event::Reject(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let last = mem::replace(&mut self.current, BufferHandle::vacant());
        let mut chain = mem::take(&mut self.chain);
        chain.push(last);
        Event::Complete(Box::new(parser.into_request(chain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::buffer::testing::pool;
    use http::Method;
    use indoc::indoc;

    /// Feeds `bytes` in reads of at most `read_size`, collecting every event.
    fn drive(handler: &mut ProtocolHandler, pool: &BufferPool, bytes: &[u8], read_size: usize) -> Vec<Event> {
        let mut events = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            if handler.prepare_read() {
                handler.attach_buffer(pool.acquire().unwrap());
            }
            let space = handler.read_space();
            let count = space.len().min(read_size).min(rest.len());
            space[..count].copy_from_slice(&rest[..count]);
            rest = &rest[count..];

            let event = handler.handle_read(count);
            let finished = matches!(event, Event::Complete(_) | Event::Reject(_));
            events.push(event);
            if finished {
                break;
            }
        }
        events
    }

    fn complete(events: Vec<Event>) -> Request {
        match events.into_iter().last() {
            Some(Event::Complete(request)) => *request,
            other => panic!("expected a complete request, got {other:?}"),
        }
    }

    #[test]
    fn get_in_one_read() {
        let pool = pool(1024);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        let request = complete(drive(&mut handler, &pool, b"GET /a?x=1 HTTP/1.1\r\nHost: h\r\n\r\n", 1024));

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/a");
        assert_eq!(request.parameter("x"), Some("1"));
        assert_eq!(request.chain().len(), 1);
    }

    #[test]
    fn small_blocks_build_a_chain() {
        let pool = pool(16);
        let config = ServerConfig::default();
        let mut handler = ProtocolHandler::new(&config);
        let input = indoc! {b"
            POST /form HTTP/1.1
            Host: example.com
            Content-Type: application/x-www-form-urlencoded
            Content-Length: 20

            name=value&other=two"};

        let request = complete(drive(&mut handler, &pool, input, 7));
        assert_eq!(request.parameter("name"), Some("value"));
        assert_eq!(request.parameter("other"), Some("two"));
        assert!(request.chain().len() > 1);
        assert_eq!(request.chain().total_len(), input.len());
        assert_eq!(request.input_stream().copy_to_vec(), b"name=value&other=two");
    }

    #[test]
    fn large_blocks_are_reused_until_the_slack_runs_out() {
        let pool = pool(4096);
        let config = ServerConfig::default().read_slack(1024);
        let mut handler = ProtocolHandler::new(&config);

        assert!(handler.prepare_read());
        handler.attach_buffer(pool.acquire().unwrap());
        let head = b"GET / HTTP/1.1\r\n";
        handler.read_space()[..head.len()].copy_from_slice(head);
        assert!(matches!(handler.handle_read(head.len()), Event::NeedRead));

        assert!(!handler.prepare_read());
        let filler = vec![b'a'; 3500];
        handler.read_space()[..7].copy_from_slice(b"X-Pad: ");
        handler.read_space()[7..7 + filler.len()].copy_from_slice(&filler);
        assert!(matches!(handler.handle_read(7 + filler.len()), Event::NeedRead));

        assert!(handler.prepare_read());
    }

    #[test]
    fn chunked_body_is_decoded() {
        let pool = pool(16);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        let input = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

        let request = complete(drive(&mut handler, &pool, input, 5));
        assert_eq!(request.input_stream().copy_to_vec(), b"Wikipedia");
        assert_eq!(request.gaps().len(), 3);
    }

    #[test]
    fn chunked_body_is_sequenced_with_continue() {
        let pool = pool(64);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());

        let events = drive(&mut handler, &pool, b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n", 64);
        assert!(matches!(events.as_slice(), [Event::SendContinue]));

        let events = drive(&mut handler, &pool, b"4\r\nWi", 64);
        assert!(matches!(events.as_slice(), [Event::SendContinue]));

        let events = drive(&mut handler, &pool, b"ki\r\n", 64);
        assert!(matches!(events.as_slice(), [Event::NeedRead]));

        let request = complete(drive(&mut handler, &pool, b"5\r\npedia\r\n0\r\n\r\n", 64));
        assert_eq!(request.input_stream().copy_to_vec(), b"Wikipedia");
    }

    #[test]
    fn continue_is_requested_once_while_the_body_is_outstanding() {
        let pool = pool(256);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        let head = b"POST /p HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\n";

        let events = drive(&mut handler, &pool, head, 256);
        assert!(matches!(events.as_slice(), [Event::SendContinue]));

        let events = drive(&mut handler, &pool, b"ab", 256);
        assert!(matches!(events.as_slice(), [Event::NeedRead]));

        let request = complete(drive(&mut handler, &pool, b"cd", 256));
        assert_eq!(request.input_stream().copy_to_vec(), b"abcd");
    }

    #[test]
    fn continue_is_skipped_when_the_body_already_arrived() {
        let pool = pool(256);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        let input = b"POST /p HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nok";

        let events = drive(&mut handler, &pool, input, 256);
        assert!(matches!(events.as_slice(), [Event::Complete(_)]));
    }

    #[test]
    fn malformed_request_is_rejected_and_blocks_are_returned() {
        let pool = pool(16);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        let events = drive(&mut handler, &pool, b"GET /index.html HTTP/2.0\r\n\r\n", 4);

        assert!(matches!(events.last(), Some(Event::Reject(StatusCode::HTTP_VERSION_NOT_SUPPORTED))));
        assert_eq!(pool.stats().borrowed, 0);
    }

    #[test]
    fn discard_returns_blocks() {
        let pool = pool(16);
        let mut handler = ProtocolHandler::new(&ServerConfig::default());
        drive(&mut handler, &pool, b"GET /unfinished HTTP/1.1\r\nHost", 8);
        assert!(pool.stats().borrowed > 0);

        handler.discard();
        assert_eq!(pool.stats().borrowed, 0);
        assert_eq!(handler.received(), 0);
    }
}
