//! `multipart/form-data` body automaton.
//!
//! Content bytes pass through a sliding window exactly as long as the delimiter
//! `CRLF--boundary`. A byte leaves the window, and only then counts as content, once
//! it can no longer be the start of a delimiter. Each window entry remembers its
//! absolute chain offset, so a file part is recorded as the range from its first
//! content byte up to the first byte of the next delimiter, without copying it.

use std::collections::VecDeque;

use http::StatusCode;
use tracing::trace;

use crate::protocol::{Part, Request};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MultipartState {
    /// Matching the delimiter in preamble or part content
    Content,
    /// Right after a delimiter: `--`, CRLF or padding follows
    AfterDelimiter,
    /// Read one `-` of the closing `--`
    CloseDash,
    /// Transport padding after a delimiter
    DelimiterLws,
    DelimiterLf,
    PartHeader,
    PartHeaderLf,
    /// After the close delimiter, ignored
    Epilogue,
}

#[derive(Debug)]
pub(crate) struct MultipartParser {
    state: MultipartState,
    delimiter: Vec<u8>,
    window: VecDeque<(u8, usize)>,
    part: Option<Part>,
    content_start: Option<usize>,
    header_line: Vec<u8>,
    value: Vec<u8>,
    max_header_length: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str, max_header_length: usize) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        // the first delimiter may open the body without a preceding CRLF
        let mut window = VecDeque::with_capacity(delimiter.len());
        window.push_back((b'\r', usize::MAX));
        window.push_back((b'\n', usize::MAX));

        Self {
            state: MultipartState::Content,
            delimiter,
            window,
            part: None,
            content_start: None,
            header_line: Vec::new(),
            value: Vec::new(),
            max_header_length,
        }
    }

    /// Feeds the body byte found at absolute offset `position`.
    pub fn consume(&mut self, byte: u8, position: usize, request: &mut Request) -> Result<(), StatusCode> {
        use MultipartState::*;

        self.state = match (self.state, byte) {
            (Content, _) => {
                self.slide(byte, position, request);
                return Ok(());
            }

            (AfterDelimiter, b'-') => CloseDash,
            (AfterDelimiter | DelimiterLws, b'\r') => DelimiterLf,
            (AfterDelimiter | DelimiterLws, b' ' | b'\t') => DelimiterLws,
            (CloseDash, b'-') => {
                trace!("multipart close delimiter");
                Epilogue
            }
            (DelimiterLf, b'\n') => {
                self.part = Some(Part::default());
                self.header_line.clear();
                PartHeader
            }

            (PartHeader, b'\r') => PartHeaderLf,
            (PartHeader, b) => {
                if self.header_line.len() >= self.max_header_length {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE);
                }
                self.header_line.push(b);
                PartHeader
            }
            (PartHeaderLf, b'\n') if self.header_line.is_empty() => self.begin_content()?,
            (PartHeaderLf, b'\n') => {
                self.apply_header()?;
                self.header_line.clear();
                PartHeader
            }

            (Epilogue, _) => Epilogue,
            (AfterDelimiter | CloseDash | DelimiterLws | DelimiterLf | PartHeaderLf, _) => {
                return Err(StatusCode::BAD_REQUEST);
            }
        };
        Ok(())
    }

    /// Checks the body ended after the close delimiter.
    pub fn finish(&self) -> Result<(), StatusCode> {
        if self.state == MultipartState::Epilogue {
            Ok(())
        } else {
            Err(StatusCode::BAD_REQUEST)
        }
    }

    fn slide(&mut self, byte: u8, position: usize, request: &mut Request) {
        self.window.push_back((byte, position));
        if self.window.len() < self.delimiter.len() {
            return;
        }

        if self.window.iter().map(|(byte, _)| *byte).eq(self.delimiter.iter().copied()) {
            let stop = self.window.front().map_or(position, |(_, position)| *position);
            self.window.clear();
            self.end_part(stop, request);
            self.state = MultipartState::AfterDelimiter;
            return;
        }

        if let Some((byte, position)) = self.window.pop_front() {
            self.emit(byte, position);
        }
    }

    fn emit(&mut self, byte: u8, position: usize) {
        let Some(part) = &self.part else {
            // preamble
            return;
        };
        if part.is_file() {
            self.content_start.get_or_insert(position);
        } else {
            self.value.push(byte);
        }
    }

    fn begin_content(&mut self) -> Result<MultipartState, StatusCode> {
        match &self.part {
            Some(part) if !part.name.is_empty() => {}
            _ => return Err(StatusCode::BAD_REQUEST),
        }
        self.content_start = None;
        self.value.clear();
        Ok(MultipartState::Content)
    }

    fn end_part(&mut self, stop: usize, request: &mut Request) {
        let Some(mut part) = self.part.take() else {
            return;
        };

        if part.is_file() {
            part.start = self.content_start.take().unwrap_or(stop);
            part.stop = stop;
            trace!(name = %part.name, start = part.start, stop = part.stop, "multipart file part");
            request.add_part(part);
        } else {
            let value = String::from_utf8_lossy(&self.value).into_owned();
            self.value.clear();
            request.add_parameter(part.name, value);
        }
    }

    fn apply_header(&mut self) -> Result<(), StatusCode> {
        let line = String::from_utf8_lossy(&self.header_line);
        let Some((name, value)) = line.split_once(':') else {
            return Err(StatusCode::BAD_REQUEST);
        };
        let Some(part) = self.part.as_mut() else {
            return Err(StatusCode::BAD_REQUEST);
        };

        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for (key, param) in disposition_params(value) {
                    match key.to_ascii_lowercase().as_str() {
                        "name" => part.name = param,
                        "filename" => part.file_name = Some(param),
                        _ => {}
                    }
                }
            }
            "content-type" => part.content_type = Some(value.to_string()),
            "content-transfer-encoding" => part.transfer_encoding = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Parameters of a `Content-Disposition` value, skipping the disposition type.
///
/// Values may be bare tokens or quoted strings with `\` escapes.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = value.chars().peekable();

    // disposition type
    for c in chars.by_ref() {
        if c == ';' {
            break;
        }
    }

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ';').is_some() {}
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ';') {
            key.push(c);
        }
        if key.is_empty() {
            break;
        }

        let mut param = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => param.extend(chars.next()),
                        c => param.push(c),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| *c != ';') {
                    param.push(c);
                }
                param.truncate(param.trim_end().len());
            }
        }
        params.push((key.trim().to_string(), param));
    }
    params
}
