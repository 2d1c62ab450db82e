//! Decoder for HTTP chunked transfer encoding.
//!
//! The decoder sits in front of a [`RequestParser`] once the head announced
//! `Transfer-Encoding: chunked`. Chunk data is relayed to the parser byte by byte;
//! size lines, the CRLF after each chunk, the terminal chunk and any trailers are not.
//! Those framing bytes stay in the buffer chain and are registered as [`Gap`]s on the
//! request instead, so the body stream reads as one contiguous payload.
//!
//! See [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).

use http::StatusCode;
use tracing::trace;
use ChunkedState::*;

use crate::codec::parser::{Action, RequestParser};
use crate::codec::url::hex_value;
use crate::stream::Gap;

#[derive(Debug)]
pub struct ChunkedTransferDecoder {
    inner: RequestParser,
    state: ChunkedState,
    chunk_size: usize,
    remaining: usize,
    content_length: usize,
    max_content_length: usize,
    gap_start: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// LF ending the size line
    SizeLf,
    /// Relay chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Skip a trailer field
    Trailer,
    /// LF ending a trailer field
    TrailerLf,
    /// CR of the final line, or the start of a trailer
    EndCr,
    /// LF of the final line
    EndLf,
    /// Terminal chunk and trailers consumed
    End,
}

impl ChunkedTransferDecoder {
    /// Wraps a parser that just answered [`Action::CheckHeaders`].
    pub fn new(inner: RequestParser, max_content_length: usize) -> Self {
        let gap_start = inner.index();
        Self {
            inner,
            state: Size,
            chunk_size: 0,
            remaining: 0,
            content_length: 0,
            max_content_length,
            gap_start,
        }
    }

    pub fn inner(&self) -> &RequestParser {
        &self.inner
    }

    pub fn into_inner(self) -> RequestParser {
        self.inner
    }

    /// Sum of the chunk sizes seen so far.
    pub fn content_length(&self) -> usize {
        self.content_length
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
        if self.state == End || self.inner.is_done() {
            return Action::Done(self.inner.status());
        }

        if self.state == Body {
            return self.relay(byte);
        }

        if let Some(action) = self.inner.skip_byte() {
            return action;
        }

        match self.step(byte) {
            Ok(state) => {
                self.state = state;
                match state {
                    Body => self.begin_chunk(),
                    End => self.end_body(),
                    _ => Action::Continue,
                }
            }
            Err(status) => self.reject(status),
        }
    }

    fn step(&mut self, byte: u8) -> Result<ChunkedState, StatusCode> {
        match self.state {
            Size => self.read_size(byte),
            SizeLws => read_size_lws(byte),
            Extension => read_extension(byte),
            SizeLf => self.read_size_lf(byte),
            BodyCr => expect(byte, b'\r', BodyLf),
            BodyLf => expect(byte, b'\n', Size),
            Trailer => read_trailer(byte),
            TrailerLf => expect(byte, b'\n', EndCr),
            EndCr => Ok(if byte == b'\r' { EndLf } else { Trailer }),
            EndLf => expect(byte, b'\n', End),
            Body | End => Ok(self.state),
        }
    }

    fn read_size(&mut self, byte: u8) -> Result<ChunkedState, StatusCode> {
        match byte {
            b'\t' | b' ' => Ok(SizeLws),
            b';' => Ok(Extension),
            b'\r' => Ok(SizeLf),
            b => {
                let digit = hex_value(b).ok_or(StatusCode::BAD_REQUEST)?;
                self.chunk_size = self
                    .chunk_size
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(usize::from(digit)))
                    .ok_or(StatusCode::PAYLOAD_TOO_LARGE)?;
                Ok(Size)
            }
        }
    }

    fn read_size_lf(&mut self, byte: u8) -> Result<ChunkedState, StatusCode> {
        if byte != b'\n' {
            return Err(StatusCode::BAD_REQUEST);
        }
        if self.chunk_size == 0 {
            return Ok(EndCr);
        }

        // the cap covers the whole request, so the chunk must fit after what was read
        let fits = self.inner.index().checked_add(self.chunk_size).is_some_and(|end| end <= self.max_content_length);
        self.content_length = self
            .content_length
            .checked_add(self.chunk_size)
            .filter(|_| fits)
            .ok_or(StatusCode::PAYLOAD_TOO_LARGE)?;
        Ok(Body)
    }

    fn begin_chunk(&mut self) -> Action {
        let gap = Gap::new(self.gap_start, self.inner.index());
        trace!(size = self.chunk_size, gap_start = gap.start, gap_stop = gap.stop, "chunk size line read");

        let content_length = self.content_length;
        let request = self.inner.request_mut();
        request.add_gap(gap);
        request.set_content_length(content_length);

        self.remaining = self.chunk_size;
        self.chunk_size = 0;
        Action::ContinueAction
    }

    fn relay(&mut self, byte: u8) -> Action {
        let action = self.inner.consume(byte);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.state = BodyCr;
            self.gap_start = self.inner.index();
        }

        match action {
            Action::Done(_) => action,
            _ => Action::Continue,
        }
    }

    fn end_body(&mut self) -> Action {
        let gap = Gap::new(self.gap_start, self.inner.index());
        trace!(content_length = self.content_length, gap_start = gap.start, gap_stop = gap.stop, "finished reading chunked data");
        self.inner.request_mut().add_gap(gap);
        self.inner.finish()
    }

    fn reject(&mut self, status: StatusCode) -> Action {
        trace!(state = ?self.state, %status, "invalid chunked encoding");
        self.state = End;
        self.inner.reject(status)
    }
}

fn expect(byte: u8, expected: u8, next: ChunkedState) -> Result<ChunkedState, StatusCode> {
    if byte == expected { Ok(next) } else { Err(StatusCode::BAD_REQUEST) }
}

fn read_size_lws(byte: u8) -> Result<ChunkedState, StatusCode> {
    match byte {
        // LWS can follow the chunk size, but no more digits can come
        b'\t' | b' ' => Ok(SizeLws),
        b';' => Ok(Extension),
        b'\r' => Ok(SizeLf),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

fn read_extension(byte: u8) -> Result<ChunkedState, StatusCode> {
    // extensions are ignored up to the CRLF, a bare LF is rejected
    match byte {
        b'\r' => Ok(SizeLf),
        b'\n' => Err(StatusCode::BAD_REQUEST),
        _ => Ok(Extension),
    }
}

fn read_trailer(byte: u8) -> Result<ChunkedState, StatusCode> {
    match byte {
        b'\r' => Ok(TrailerLf),
        _ => Ok(Trailer),
    }
}
