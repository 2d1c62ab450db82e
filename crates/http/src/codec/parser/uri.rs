//! Sub-automata for the request target and for `name=value&...` sequences.
//!
//! Both only split their input while it streams in. Percent-decoding happens once a
//! complete token is known, so an escape cut in half by a read boundary is never
//! decoded early.

use crate::codec::url::decode_url;
use crate::protocol::DecodeError;

/// Raw components of a request target. Nothing is decoded yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct UriParts {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Vec<u8>,
    pub query: Vec<u8>,
}

/// The target is not a valid origin, absolute or asterisk form.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct InvalidUri;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum UriState {
    Start,
    Asterisk,
    Scheme,
    SchemeSlash,
    SchemeSlashSlash,
    Host,
    Ipv6Host,
    HostEnd,
    Port,
    Path,
    Query,
    Fragment,
}

/// Splits origin-form (`/p?q`), absolute-form (`http://h:1/p?q`) and asterisk-form
/// targets into their components. Fragments are dropped.
#[derive(Debug)]
pub(crate) struct UriParser {
    state: UriState,
    scheme: Vec<u8>,
    host: Vec<u8>,
    port: Option<u32>,
    parts: UriParts,
}

impl Default for UriParser {
    fn default() -> Self {
        Self { state: UriState::Start, scheme: Vec::new(), host: Vec::new(), port: None, parts: UriParts::default() }
    }
}

impl UriParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte of the target. `Err` means the target is malformed.
    pub fn consume(&mut self, byte: u8) -> Result<(), InvalidUri> {
        use UriState::*;

        self.state = match (self.state, byte) {
            (Start, b'/') => {
                self.parts.path.push(byte);
                Path
            }
            (Start, b'*') => Asterisk,
            (Start, b) if b.is_ascii_alphabetic() => {
                self.scheme.push(b);
                Scheme
            }
            (Start | Asterisk, _) => return Err(InvalidUri),

            (Scheme, b) if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.') => {
                self.scheme.push(b);
                Scheme
            }
            (Scheme, b':') => SchemeSlash,
            (SchemeSlash, b'/') => SchemeSlashSlash,
            (SchemeSlashSlash, b'/') => Host,
            (Scheme | SchemeSlash | SchemeSlashSlash, _) => return Err(InvalidUri),

            (Host, b'[') if self.host.is_empty() => {
                self.host.push(byte);
                Ipv6Host
            }
            (Host, b':') => Port,
            (Host | HostEnd | Port, b'/') => {
                self.parts.path.push(byte);
                Path
            }
            (Host | HostEnd | Port, b'?') => Query,
            (Host | HostEnd | Port, b'#') => Fragment,
            (Host, b) if is_host_byte(b) => {
                self.host.push(b);
                Host
            }
            (Host, _) => return Err(InvalidUri),

            (Ipv6Host, b']') => {
                self.host.push(byte);
                HostEnd
            }
            (Ipv6Host, b) if b.is_ascii_hexdigit() || matches!(b, b':' | b'.') => {
                self.host.push(b);
                Ipv6Host
            }
            (Ipv6Host, _) => return Err(InvalidUri),

            (HostEnd, b':') => Port,
            (HostEnd, _) => return Err(InvalidUri),

            (Port, b @ b'0'..=b'9') => {
                let port = self.port.unwrap_or(0) * 10 + u32::from(b - b'0');
                if port > u32::from(u16::MAX) {
                    return Err(InvalidUri);
                }
                self.port = Some(port);
                Port
            }
            (Port, _) => return Err(InvalidUri),

            (Path, b'?') => Query,
            (Path | Query, b'#') => Fragment,
            (Path, b) => {
                self.parts.path.push(b);
                Path
            }
            (Query, b) => {
                self.parts.query.push(b);
                Query
            }
            (Fragment, _) => Fragment,
        };
        Ok(())
    }

    /// Completes the target. `Err` when it stopped half way through a component.
    pub fn finish(mut self) -> Result<UriParts, InvalidUri> {
        match self.state {
            UriState::Start | UriState::Scheme | UriState::SchemeSlash | UriState::SchemeSlashSlash | UriState::Ipv6Host => {
                return Err(InvalidUri);
            }
            UriState::Asterisk => self.parts.path.push(b'*'),
            _ => {}
        }

        if !self.scheme.is_empty() {
            if self.host.is_empty() {
                return Err(InvalidUri);
            }
            self.parts.scheme = Some(String::from_utf8_lossy(&self.scheme).to_ascii_lowercase());
            self.parts.host = Some(String::from_utf8_lossy(&self.host).into_owned());
            self.parts.port = self.port.and_then(|port| u16::try_from(port).ok());
            if self.parts.path.is_empty() {
                self.parts.path.push(b'/');
            }
        }
        Ok(self.parts)
    }
}

#[inline]
fn is_host_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~' | b'%' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=')
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum QueryState {
    Name,
    Value,
}

/// Splits `a=1&b=2` into decoded pairs, one byte at a time.
///
/// Used for the query string and for `application/x-www-form-urlencoded` bodies.
#[derive(Debug)]
pub(crate) struct QueryParser {
    state: QueryState,
    name: Vec<u8>,
    value: Vec<u8>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self { state: QueryState::Name, name: Vec::new(), value: Vec::new() }
    }
}

impl QueryParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte and yields a pair whenever an `&` completes one.
    pub fn consume(&mut self, byte: u8) -> Result<Option<(String, String)>, DecodeError> {
        match (self.state, byte) {
            (_, b'&') => return self.take(),
            (QueryState::Name, b'=') => self.state = QueryState::Value,
            (QueryState::Name, b) => self.name.push(b),
            (QueryState::Value, b) => self.value.push(b),
        }
        Ok(None)
    }

    /// Yields the pair still pending at the end of input.
    pub fn finish(&mut self) -> Result<Option<(String, String)>, DecodeError> {
        self.take()
    }

    /// Decodes a complete query string.
    pub fn parse_all(input: &[u8]) -> Result<Vec<(String, String)>, DecodeError> {
        let mut parser = Self::new();
        let mut pairs = Vec::new();
        for &byte in input {
            pairs.extend(parser.consume(byte)?);
        }
        pairs.extend(parser.finish()?);
        Ok(pairs)
    }

    fn take(&mut self) -> Result<Option<(String, String)>, DecodeError> {
        self.state = QueryState::Name;
        if self.name.is_empty() && self.value.is_empty() {
            return Ok(None);
        }

        let name = decode_url(&self.name);
        let value = decode_url(&self.value);
        self.name.clear();
        self.value.clear();
        Ok(Some((name?, value?)))
    }
}
