//! Request fixtures shared by the parser benchmarks.
//!
//! A [`TestCase`] pairs a fixture with the read size it is fed in, since the parser
//! sees the same bytes whether they arrive in one read or in many small ones.

use std::fmt::Write;

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
    read_size: usize,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile, read_size: usize) -> Self {
        Self { name, group, file, read_size }
    }

    /// Fed in a single read.
    pub fn whole(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Whole, file, usize::MAX)
    }

    /// Fed in reads of `read_size` bytes.
    pub fn split(name: &'static str, file: TestFile, read_size: usize) -> Self {
        Self::new(name, TestGroup::Split, file, read_size)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }

    /// The fixture cut into the reads the parser is fed with.
    pub fn reads(&self) -> impl Iterator<Item = &'static [u8]> {
        self.file.content().as_bytes().chunks(self.read_size.max(1))
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Whole,
    Split,
}

/// A `POST` with a chunked body of `chunks` chunks of `chunk_size` bytes each.
pub fn chunked_request(chunks: usize, chunk_size: usize) -> Vec<u8> {
    let mut request = String::from("POST /upload HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n");
    let payload = "x".repeat(chunk_size);
    for _ in 0..chunks {
        let _ = write!(request, "{chunk_size:x}\r\n{payload}\r\n");
    }
    request.push_str("0\r\n\r\n");
    request.into_bytes()
}

/// A `multipart/form-data` upload with two fields and one file of `file_size` bytes.
pub fn multipart_request(file_size: usize) -> Vec<u8> {
    let mut body = String::new();
    for (name, value) in [("a", "1"), ("b", "2")] {
        let _ = write!(body, "------X\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n");
    }
    body.push_str("------X\r\nContent-Disposition: form-data; name=\"file\"; filename=\"data.bin\"\r\n");
    body.push_str("Content-Type: application/octet-stream\r\n\r\n");
    body.push_str(&"y".repeat(file_size));
    body.push_str("\r\n------X--\r\n");

    let mut request = format!(
        "POST /form HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary=----X\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    request.push_str(&body);
    request.into_bytes()
}
