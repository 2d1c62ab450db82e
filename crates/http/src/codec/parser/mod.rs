//! Byte-at-a-time HTTP/1.1 request parser.
//!
//! [`RequestParser::consume`] takes exactly one byte and answers with an [`Action`].
//! The parser never looks ahead and never needs a byte twice, so it can be fed from
//! reads of any size, split anywhere. Errors are not `Result`s: they come back as
//! [`Action::Done`] carrying the status to answer with.
//!
//! ```text
//! Start -> Method -> Uri -> Version -> RequestLineLf
//!       -> HeaderStart <-> HeaderName -> HeaderLws -> HeaderValue -> HeaderLf
//!       -> HeadersEndLf -> validation
//!       -> PostParams | Multipart | Remainder | End
//! ```
//!
//! Validation runs once, when the empty line ending the head arrives. A request
//! without a body is then done. Otherwise the parser answers [`Action::CheckHeaders`]
//! so the caller can wrap it in a
//! [`ChunkedTransferDecoder`](crate::codec::ChunkedTransferDecoder) and send an interim
//! `100 Continue` before feeding the body.

mod multipart;
mod uri;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, EXPECT, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Method, StatusCode, Version};
use mime::Mime;
use tracing::{debug, trace};

use crate::buffer::BufferChain;
use crate::codec::url::decode_path;
use crate::config::{ParserLimits, ServerConfig};
use crate::ensure;
use crate::protocol::Request;

use multipart::MultipartParser;
use uri::{QueryParser, UriParser};

/// Longest accepted version token, `HTTP/1.1` needs 8.
const MAX_VERSION_LENGTH: usize = 16;

/// Longest accepted multipart boundary.
const MAX_BOUNDARY_LENGTH: usize = 70;

/// What the caller must do after feeding one byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Keep feeding bytes.
    Continue,
    /// Parsing is over. `200 OK` and `100 Continue` mean success, any other status is
    /// the error to answer with.
    Done(StatusCode),
    /// The head is parsed and validated and a body follows. Decide on chunked decoding
    /// and an interim response, then keep feeding.
    CheckHeaders,
    /// An intermediate step finished, such as a chunk size line. Keep feeding.
    ContinueAction,
}

impl Action {
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done(_))
    }

    /// `true` for a finished parse whose status is a success.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Action::Done(status) if is_success(*status))
    }
}

#[inline]
pub(crate) fn is_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CONTINUE
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Start,
    Method,
    Uri,
    Version,
    RequestLineLf,
    HeaderStart,
    HeaderName,
    HeaderLws,
    HeaderValue,
    HeaderLf,
    HeadersEndLf,
    PostParams,
    Multipart,
    Remainder,
    End,
}

/// In-progress tokens of the request head.
#[derive(Debug, Default)]
struct Token {
    method: Vec<u8>,
    uri: Vec<u8>,
    version: Vec<u8>,
    name: Vec<u8>,
    value: Vec<u8>,
}

#[derive(Debug)]
pub struct RequestParser {
    state: State,
    token: Token,
    uri: UriParser,
    query: QueryParser,
    multipart: Option<MultipartParser>,
    request: Request,
    limits: ParserLimits,
    max_content_length: usize,
    index: usize,
    body_start: usize,
    body_read: usize,
    chunked: bool,
    expect_continue: bool,
    status: StatusCode,
}

impl RequestParser {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: State::Start,
            token: Token::default(),
            uri: UriParser::new(),
            query: QueryParser::new(),
            multipart: None,
            request: Request::new(),
            limits: config.limits.clone(),
            max_content_length: config.maximal_content_length,
            index: 0,
            body_start: 0,
            body_read: 0,
            chunked: false,
            expect_continue: false,
            status: StatusCode::OK,
        }
    }

    /// Bytes consumed so far, framing skipped by a chunked decoder included. This is
    /// the absolute chain offset of the next byte.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// `Transfer-Encoding: chunked` was announced.
    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// `Expect: 100-continue` was sent.
    #[inline]
    pub fn expect_continue(&self) -> bool {
        self.expect_continue
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == State::End
    }

    /// Status the parse ends with so far.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Hands over the request, backed by the blocks holding the bytes fed so far.
    pub fn into_request(mut self, chain: BufferChain) -> Request {
        self.request.set_body_range(self.body_start, self.index);
        self.request.attach_chain(chain);
        self.request
    }

    /// Feeds bytes until an action other than [`Action::Continue`] comes up. Returns
    /// that action and the number of bytes consumed.
    pub fn parse(&mut self, bytes: &[u8]) -> (Action, usize) {
        for (consumed, &byte) in bytes.iter().enumerate() {
            match self.consume(byte) {
                Action::Continue => {}
                action => return (action, consumed + 1),
            }
        }
        (Action::Continue, bytes.len())
    }

    pub fn consume(&mut self, byte: u8) -> Action {
        if self.state == State::End {
            return Action::Done(self.status);
        }

        let position = self.index;
        self.index += 1;
        if self.index > self.max_content_length {
            return self.reject(StatusCode::PAYLOAD_TOO_LARGE);
        }

        let result = match self.state {
            State::Start => self.on_start(byte),
            State::Method => self.on_method(byte),
            State::Uri => self.on_uri(byte),
            State::Version => self.on_version(byte),
            State::RequestLineLf => self.expect_lf(byte, State::HeaderStart),
            State::HeaderStart if byte == b'\n' => match self.commit_header() {
                Ok(()) => return self.end_of_head(),
                Err(status) => Err(status),
            },
            State::HeaderStart => self.on_header_start(byte),
            State::HeaderName => self.on_header_name(byte),
            State::HeaderLws => self.on_header_lws(byte),
            State::HeaderValue => self.on_header_value(byte),
            State::HeaderLf => self.expect_lf(byte, State::HeaderStart),
            State::HeadersEndLf => match byte {
                b'\n' => return self.end_of_head(),
                _ => Err(StatusCode::BAD_REQUEST),
            },
            State::PostParams | State::Multipart | State::Remainder => return self.on_body(byte, position),
            State::End => Ok(()),
        };

        match result {
            Ok(()) => Action::Continue,
            Err(status) => self.reject(status),
        }
    }

    /// Accounts for a byte the parser never sees, like chunk framing. `Some` carries
    /// the rejection when the byte crosses the content length cap.
    pub(crate) fn skip_byte(&mut self) -> Option<Action> {
        self.index += 1;
        (self.index > self.max_content_length).then(|| self.reject(StatusCode::PAYLOAD_TOO_LARGE))
    }

    /// Ends the body. Called at the end of declared content or by a chunked decoder
    /// on the terminal chunk.
    pub fn finish(&mut self) -> Action {
        let result = match self.state {
            State::End => return Action::Done(self.status),
            State::PostParams => self.flush_param(),
            State::Multipart => self.multipart.as_ref().map_or(Ok(()), MultipartParser::finish),
            State::Remainder => Ok(()),
            _ => Err(StatusCode::BAD_REQUEST),
        };

        match result {
            Ok(()) => {
                trace!(status = %self.status, length = self.index, "request parsed");
                self.state = State::End;
                Action::Done(self.status)
            }
            Err(status) => self.reject(status),
        }
    }

    pub(crate) fn reject(&mut self, status: StatusCode) -> Action {
        debug!(state = ?self.state, %status, index = self.index, "request rejected");
        self.state = State::End;
        self.status = status;
        Action::Done(status)
    }

    fn expect_lf(&mut self, byte: u8, next: State) -> Result<(), StatusCode> {
        ensure!(byte == b'\n', StatusCode::BAD_REQUEST);
        self.state = next;
        Ok(())
    }

    fn on_start(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            // tolerate empty lines before the request line
            b'\r' | b'\n' => Ok(()),
            b if is_token(b) => {
                self.token.method.push(b);
                self.state = State::Method;
                Ok(())
            }
            _ => Err(StatusCode::BAD_REQUEST),
        }
    }

    fn on_method(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b' ' => self.state = State::Uri,
            b if is_token(b) => {
                ensure!(self.token.method.len() < self.limits.max_method_length, StatusCode::BAD_REQUEST);
                self.token.method.push(b);
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        Ok(())
    }

    fn on_uri(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b' ' if !self.token.uri.is_empty() => self.state = State::Version,
            b if b.is_ascii_graphic() => {
                ensure!(self.token.uri.len() < self.limits.max_uri_length, StatusCode::URI_TOO_LONG);
                self.token.uri.push(b);
                self.uri.consume(b).map_err(|_| StatusCode::BAD_REQUEST)?;
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        Ok(())
    }

    fn on_version(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b'\r' => {
                self.request.set_version(parse_version(&self.token.version)?);
                self.state = State::RequestLineLf;
            }
            b'\n' => {
                self.request.set_version(parse_version(&self.token.version)?);
                self.state = State::HeaderStart;
            }
            b if b.is_ascii_graphic() => {
                ensure!(self.token.version.len() < MAX_VERSION_LENGTH, StatusCode::BAD_REQUEST);
                self.token.version.push(b);
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        Ok(())
    }

    fn on_header_start(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b' ' | b'\t' => {
                // folded continuation of the previous value
                ensure!(!self.token.name.is_empty(), StatusCode::BAD_REQUEST);
                if !self.token.value.is_empty() {
                    self.push_value(b' ')?;
                }
                self.state = State::HeaderLws;
            }
            b'\r' => {
                self.commit_header()?;
                self.state = State::HeadersEndLf;
            }
            b if is_token(b) => {
                self.commit_header()?;
                self.token.name.push(b);
                self.state = State::HeaderName;
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        Ok(())
    }

    fn on_header_name(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b':' => self.state = State::HeaderLws,
            b'\r' => self.state = State::HeaderLf,
            b'\n' => self.state = State::HeaderStart,
            b if is_token(b) => {
                ensure!(self.token.name.len() < self.limits.max_header_name_length, StatusCode::PAYLOAD_TOO_LARGE);
                self.token.name.push(b);
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        Ok(())
    }

    fn on_header_lws(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b' ' | b'\t' => {}
            b'\r' => self.state = State::HeaderLf,
            b'\n' => self.state = State::HeaderStart,
            b => {
                self.push_value(b)?;
                self.state = State::HeaderValue;
            }
        }
        Ok(())
    }

    fn on_header_value(&mut self, byte: u8) -> Result<(), StatusCode> {
        match byte {
            b'\r' => self.state = State::HeaderLf,
            b'\n' => self.state = State::HeaderStart,
            b => self.push_value(b)?,
        }
        Ok(())
    }

    fn push_value(&mut self, byte: u8) -> Result<(), StatusCode> {
        ensure!(byte == b'\t' || !byte.is_ascii_control(), StatusCode::BAD_REQUEST);
        ensure!(self.token.value.len() < self.limits.max_header_value_length, StatusCode::PAYLOAD_TOO_LARGE);
        self.token.value.push(byte);
        Ok(())
    }

    fn commit_header(&mut self) -> Result<(), StatusCode> {
        if self.token.name.is_empty() {
            return Ok(());
        }

        let trimmed = self.token.value.trim_ascii_end().len();
        self.token.value.truncate(trimmed);

        let name = HeaderName::from_bytes(&self.token.name).map_err(|_| StatusCode::BAD_REQUEST)?;
        let value = HeaderValue::from_bytes(&self.token.value).map_err(|_| StatusCode::BAD_REQUEST)?;
        ensure!(self.request.headers().len() < self.limits.max_header_count, StatusCode::PAYLOAD_TOO_LARGE);

        trace!(name = %name, "header parsed");
        self.request.add_header(name, value);
        self.token.name.clear();
        self.token.value.clear();
        Ok(())
    }

    fn end_of_head(&mut self) -> Action {
        if let Err(status) = self.validate() {
            return self.reject(status);
        }

        self.body_start = self.index;
        let has_body = self.chunked || self.request.content_length() > 0;
        if !has_body {
            self.state = State::End;
            self.status = StatusCode::OK;
            trace!(method = %self.request.method(), path = self.request.path(), "request parsed without body");
            return Action::Done(self.status);
        }

        trace!(
            method = %self.request.method(),
            content_length = self.request.content_length(),
            chunked = self.chunked,
            state = ?self.state,
            "request head parsed"
        );
        Action::CheckHeaders
    }

    /// Checks the complete head and decides how the body is parsed.
    fn validate(&mut self) -> Result<(), StatusCode> {
        let method = parse_method(&self.token.method)?;
        self.request.set_method(method.clone());

        let uri = std::mem::take(&mut self.uri).finish().map_err(|_| StatusCode::BAD_REQUEST)?;
        self.request.set_uri(String::from_utf8_lossy(&self.token.uri).into_owned());
        self.request.set_path(decode_path(&uri.path).map_err(|_| StatusCode::BAD_REQUEST)?);
        if let Some(scheme) = uri.scheme {
            self.request.set_scheme(scheme);
        }
        if let Some(host) = uri.host {
            self.request.set_host(decode_path(host.as_bytes()).map_err(|_| StatusCode::BAD_REQUEST)?);
        }
        if let Some(port) = uri.port {
            self.request.set_port(port);
        }
        for (name, value) in QueryParser::parse_all(&uri.query).map_err(|_| StatusCode::BAD_REQUEST)? {
            self.request.add_parameter(name, value);
        }
        self.request.set_query(String::from_utf8_lossy(&uri.query).into_owned());

        let content_type = self
            .request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Mime>().ok());

        let content_length = self.content_length()?;
        self.chunked = self.transfer_encoding()?;

        if let Some(expect) = self.request.headers().get(EXPECT) {
            ensure!(expect.as_bytes().eq_ignore_ascii_case(b"100-continue"), StatusCode::BAD_REQUEST);
            self.expect_continue = true;
        }

        if method == Method::TRACE {
            let has_body_headers =
                self.request.headers().contains_key(CONTENT_LENGTH) || self.request.headers().contains_key(TRANSFER_ENCODING);
            ensure!(!has_body_headers, StatusCode::BAD_REQUEST);
        }

        // chunk sizes add up as they arrive
        self.request.set_content_length(if self.chunked { 0 } else { content_length });
        // chunked bodies are sequenced with interim responses like an expect-continue body
        self.status = if self.expect_continue || self.chunked { StatusCode::CONTINUE } else { StatusCode::OK };

        self.state = match &content_type {
            Some(media) if media.type_() == mime::MULTIPART && media.subtype() == mime::FORM_DATA => {
                let boundary = media.get_param(mime::BOUNDARY).map(|boundary| boundary.as_str()).unwrap_or_default();
                ensure!(!boundary.is_empty() && boundary.len() <= MAX_BOUNDARY_LENGTH, StatusCode::BAD_REQUEST);
                self.multipart = Some(MultipartParser::new(boundary, self.limits.max_header_value_length));
                State::Multipart
            }
            Some(media) if method == Method::POST && media.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => {
                State::PostParams
            }
            _ => State::Remainder,
        };
        if let Some(media) = content_type {
            self.request.set_content_type(media);
        }
        Ok(())
    }

    fn content_length(&self) -> Result<usize, StatusCode> {
        let mut length = None;
        for value in self.request.headers().get_all(CONTENT_LENGTH) {
            let parsed = value
                .to_str()
                .ok()
                .map(str::trim)
                .filter(|value| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()))
                .ok_or(StatusCode::BAD_REQUEST)?
                .parse::<usize>()
                .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

            ensure!(length.is_none_or(|length| length == parsed), StatusCode::BAD_REQUEST);
            length = Some(parsed);
        }

        let length = length.unwrap_or(0);
        ensure!(length <= self.max_content_length, StatusCode::PAYLOAD_TOO_LARGE);
        Ok(length)
    }

    fn transfer_encoding(&self) -> Result<bool, StatusCode> {
        let mut chunked = false;
        for value in self.request.headers().get_all(TRANSFER_ENCODING) {
            let value = value.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;
            for coding in value.split(',').map(str::trim).filter(|coding| !coding.is_empty()) {
                if coding.eq_ignore_ascii_case("chunked") {
                    chunked = true;
                } else if !coding.eq_ignore_ascii_case("identity") {
                    return Err(StatusCode::NOT_IMPLEMENTED);
                }
            }
        }
        Ok(chunked)
    }

    fn on_body(&mut self, byte: u8, position: usize) -> Action {
        let result = match self.state {
            State::PostParams => match self.query.consume(byte) {
                Ok(Some((name, value))) => {
                    self.request.add_parameter(name, value);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(_) => Err(StatusCode::BAD_REQUEST),
            },
            State::Multipart => match self.multipart.as_mut() {
                Some(multipart) => multipart.consume(byte, position, &mut self.request),
                None => Err(StatusCode::INTERNAL_SERVER_ERROR),
            },
            _ => Ok(()),
        };
        if let Err(status) = result {
            return self.reject(status);
        }

        self.body_read += 1;
        if !self.chunked && self.body_read >= self.request.content_length() {
            return self.finish();
        }
        Action::Continue
    }

    fn flush_param(&mut self) -> Result<(), StatusCode> {
        match self.query.finish() {
            Ok(Some((name, value))) => {
                self.request.add_parameter(name, value);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => Err(StatusCode::BAD_REQUEST),
        }
    }
}

/// RFC 9110 `tchar`.
#[inline]
fn is_token(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

fn parse_method(token: &[u8]) -> Result<Method, StatusCode> {
    let upper = token.to_ascii_uppercase();
    match upper.as_slice() {
        b"GET" => Ok(Method::GET),
        b"POST" => Ok(Method::POST),
        b"HEAD" => Ok(Method::HEAD),
        b"PUT" => Ok(Method::PUT),
        b"DELETE" => Ok(Method::DELETE),
        b"TRACE" => Ok(Method::TRACE),
        b"OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(StatusCode::METHOD_NOT_ALLOWED),
    }
}

fn parse_version(token: &[u8]) -> Result<Version, StatusCode> {
    let Some(digits) = token.strip_prefix(b"HTTP/") else {
        return Err(StatusCode::BAD_REQUEST);
    };
    match digits {
        b"1.1" => Ok(Version::HTTP_11),
        b"1.0" => Ok(Version::HTTP_10),
        [b'1', b'.', minor] if minor.is_ascii_digit() => Ok(Version::HTTP_11),
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => Err(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
        [major] if major.is_ascii_digit() => Err(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

#[cfg(test)]
mod tests;
