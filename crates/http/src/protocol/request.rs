//! The parse target: everything the parser learns about one request.
//!
//! The parser only ever calls the `pub(crate)` setters below during its single pass.
//! Once the request reaches a dispatcher it is read-only, and its body bytes are read
//! straight out of the backing [`BufferChain`] through an [`InputStreamView`].

use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use mime::Mime;

use crate::buffer::BufferChain;
use crate::stream::{Gap, InputStreamView};

/// Decoded request parameters from the query string and urlencoded or multipart bodies.
///
/// A name may carry several values, kept in arrival order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Parameters {
    inner: BTreeMap<String, Vec<String>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub(crate) fn add(&mut self, name: String, value: String) {
        self.inner.entry(name).or_default().push(value);
    }
}

/// One section of a `multipart/form-data` body.
///
/// File parts are not copied: `start..stop` addresses their content inside the
/// request's buffer chain. Plain fields are not kept as parts: their values end up
/// in [`Request::parameters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub transfer_encoding: Option<String>,
    pub start: usize,
    pub stop: usize,
}

impl Part {
    /// A part with a non-empty file name is an upload.
    pub fn is_file(&self) -> bool {
        self.file_name.as_deref().is_some_and(|name| !name.is_empty())
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }
}

#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    version: Version,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: String,
    headers: HeaderMap,
    parameters: Parameters,
    parts: Vec<Part>,
    content_type: Option<Mime>,
    content_length: usize,
    chain: BufferChain,
    gaps: Vec<Gap>,
    body_start: usize,
    body_end: usize,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: String::new(),
            version: Version::HTTP_11,
            scheme: None,
            host: None,
            port: None,
            path: String::new(),
            query: String::new(),
            headers: HeaderMap::new(),
            parameters: Parameters::new(),
            parts: Vec::new(),
            content_type: None,
            content_length: 0,
            chain: BufferChain::new(),
            gaps: Vec::new(),
            body_start: 0,
            body_end: 0,
        }
    }
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as received.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Scheme of an absolute-form target, e.g. `http`.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Host of an absolute-form target.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Percent-decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name` if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Declared body length, or the sum of all chunk sizes for a chunked body.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn chain(&self) -> &BufferChain {
        &self.chain
    }

    /// Chunk framing hidden from the body stream.
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Absolute chain offsets `[start, end)` of the body, framing included.
    pub fn body_range(&self) -> (usize, usize) {
        (self.body_start, self.body_end)
    }

    /// The body as a stream, with chunk framing skipped.
    pub fn input_stream(&self) -> InputStreamView<'_> {
        InputStreamView::new(&self.chain, &self.gaps, self.body_start, self.body_end)
    }

    /// The content of one multipart part.
    pub fn part_stream(&self, part: &Part) -> InputStreamView<'_> {
        InputStreamView::new(&self.chain, &self.gaps, part.start, part.stop)
    }

    /// Copies the content of one multipart part.
    pub fn part_bytes(&self, part: &Part) -> Vec<u8> {
        self.part_stream(part).copy_to_vec()
    }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub(crate) fn set_uri(&mut self, uri: String) {
        self.uri = uri;
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn set_scheme(&mut self, scheme: String) {
        self.scheme = Some(scheme);
    }

    pub(crate) fn set_host(&mut self, host: String) {
        self.host = Some(host);
    }

    pub(crate) fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub(crate) fn set_query(&mut self, query: String) {
        self.query = query;
    }

    pub(crate) fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub(crate) fn add_parameter(&mut self, name: String, value: String) {
        self.parameters.add(name, value);
    }

    pub(crate) fn add_part(&mut self, part: Part) {
        self.parts.push(part);
    }

    pub(crate) fn set_content_type(&mut self, content_type: Mime) {
        self.content_type = Some(content_type);
    }

    pub(crate) fn set_content_length(&mut self, content_length: usize) {
        self.content_length = content_length;
    }

    /// Registers framing bytes to hide. Gaps arrive in ascending order and touching
    /// gaps are merged.
    pub(crate) fn add_gap(&mut self, gap: Gap) {
        if gap.is_empty() {
            return;
        }
        match self.gaps.last_mut() {
            Some(last) if last.stop >= gap.start => last.stop = last.stop.max(gap.stop),
            _ => self.gaps.push(gap),
        }
    }

    pub(crate) fn set_body_range(&mut self, start: usize, end: usize) {
        self.body_start = start;
        self.body_end = end.max(start);
    }

    pub(crate) fn attach_chain(&mut self, chain: BufferChain) {
        self.chain = chain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::testing::{chain_of, pool};

    #[test]
    fn parameters_keep_every_value_in_order() {
        let mut parameters = Parameters::new();
        parameters.add("a".into(), "1".into());
        parameters.add("b".into(), "2".into());
        parameters.add("a".into(), "3".into());

        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters.get("a"), Some("1"));
        assert_eq!(parameters.get_all("a"), ["1", "3"]);
        assert!(parameters.get_all("missing").is_empty());
    }

    #[test]
    fn adjacent_gaps_are_merged() {
        let mut request = Request::new();
        request.add_gap(Gap::new(2, 4));
        request.add_gap(Gap::new(4, 6));
        request.add_gap(Gap::new(6, 6));
        request.add_gap(Gap::new(9, 10));

        assert_eq!(request.gaps(), &[Gap::new(2, 6), Gap::new(9, 10)]);
    }

    #[test]
    fn input_stream_covers_the_body_only() {
        let pool = pool(8);
        let mut request = Request::new();
        request.attach_chain(chain_of(&pool, &[b"HEAD\r\n\r\n", b"3\r\nabc\r\n", b"0\r\n\r\n"]));
        request.set_body_range(8, 21);
        request.add_gap(Gap::new(8, 11));
        request.add_gap(Gap::new(14, 21));

        assert_eq!(request.input_stream().copy_to_vec(), b"abc");
    }

    #[test]
    fn part_bytes_reads_the_part_range() {
        let pool = pool(4);
        let mut request = Request::new();
        request.attach_chain(chain_of(&pool, &[b"xxhe", b"llox"]));
        let part = Part { name: "f".into(), file_name: Some("a.txt".into()), start: 2, stop: 7, ..Part::default() };

        assert!(part.is_file());
        assert_eq!(request.part_bytes(&part), b"hello");
    }
}
