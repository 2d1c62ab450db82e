//! Read-only, seekable byte stream over a [`BufferChain`].
//!
//! The view addresses bytes by absolute chain offset and only exposes the window
//! `[start, end)`. Byte ranges registered as [`Gap`]s are skipped transparently, which
//! is how chunked transfer framing disappears from the body a servlet reads without
//! any copying or rewriting of the blocks.

use std::io;

use bytes::Buf;

use crate::buffer::BufferChain;

/// A half-open `[start, stop)` range of absolute offsets hidden from readers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Gap {
    pub start: usize,
    pub stop: usize,
}

impl Gap {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop: stop.max(start) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    #[inline]
    fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.stop
    }
}

/// Cursor over a window of a [`BufferChain`] that honours gaps.
///
/// The source gaps must be sorted and must not overlap. The position always lies in
/// `[start, end]` and never inside a gap. [`setup`](Self::setup) re-windows the same
/// view, so one instance can walk every part of a multipart request in turn.
#[derive(Debug)]
pub struct InputStreamView<'a> {
    chain: &'a BufferChain,
    source_gaps: &'a [Gap],
    gaps: Vec<Gap>,
    start: usize,
    end: usize,
    position: usize,
    buffer_index: usize,
    buffer_offset: usize,
    // first gap whose stop lies after `position`
    gap_cursor: usize,
}

impl<'a> InputStreamView<'a> {
    pub fn new(chain: &'a BufferChain, gaps: &'a [Gap], start: usize, end: usize) -> Self {
        let mut view = Self {
            chain,
            source_gaps: gaps,
            gaps: Vec::new(),
            start: 0,
            end: 0,
            position: 0,
            buffer_index: 0,
            buffer_offset: 0,
            gap_cursor: 0,
        };
        view.setup(start, end);
        view
    }

    /// Re-windows the view to `[start, end)` and rewinds it.
    ///
    /// Gaps are clipped to the window. A window starting inside a gap begins at the
    /// gap's end, and gaps touching the end of the window shrink it, so a gap is never
    /// the last thing in the window.
    pub fn setup(&mut self, start: usize, end: usize) {
        let end = end.min(self.chain.total_len());
        let mut start = start.min(end);

        self.gaps.clear();
        self.gaps.extend(
            self.source_gaps
                .iter()
                .filter(|gap| gap.stop > start && gap.start < end)
                .map(|gap| Gap::new(gap.start.max(start), gap.stop.min(end)))
                .filter(|gap| !gap.is_empty()),
        );

        let leading = self.gaps.iter().take_while(|gap| gap.contains(start) && { start = gap.stop; true }).count();
        self.gaps.drain(..leading);

        let mut end = end.max(start);
        while let Some(last) = self.gaps.last() {
            if last.stop < end {
                break;
            }
            end = last.start.max(start);
            self.gaps.pop();
        }

        self.start = start;
        self.end = end;
        self.place(start);
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Absolute offset of the next byte.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Gaps in effect for the current window.
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Bytes left before the end of the window, not counting gaps.
    pub fn available(&self) -> usize {
        let hidden: usize = self.gaps[self.gap_cursor..].iter().map(Gap::len).sum();
        self.end - self.position - hidden
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.position >= self.end
    }

    /// The next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        if self.is_eof() {
            return None;
        }
        self.chain.get(self.buffer_index).map(|handle| handle.filled()[self.buffer_offset])
    }

    /// Steps back one readable byte. Returns `false` at the start of the window.
    pub fn pushback(&mut self) -> bool {
        let mut candidate = self.position;
        loop {
            if candidate <= self.start {
                return false;
            }
            candidate -= 1;
            match self.gaps.iter().rev().find(|gap| gap.contains(candidate)) {
                Some(gap) => candidate = gap.start,
                None => break,
            }
        }
        self.place(candidate);
        true
    }

    /// Moves to absolute offset `index`, clamped to the window and snapped past gaps.
    pub fn seek(&mut self, index: usize) {
        self.place(index);
    }

    /// Drains the rest of the window into a vector.
    pub fn copy_to_vec(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.available());
        while self.has_remaining() {
            let chunk = self.chunk();
            out.extend_from_slice(chunk);
            let len = chunk.len();
            self.step_over(len);
        }
        out
    }

    fn place(&mut self, index: usize) {
        let mut index = index.clamp(self.start, self.end);

        self.gap_cursor = self.gaps.partition_point(|gap| gap.stop <= index);
        while let Some(gap) = self.gaps.get(self.gap_cursor) {
            if gap.start > index {
                break;
            }
            index = gap.stop;
            self.gap_cursor += 1;
        }

        self.position = index.min(self.end);
        (self.buffer_index, self.buffer_offset) = self.chain.locate(self.position).unwrap_or((self.chain.len(), 0));
    }

    // `count` must not cross a block end, a gap or the window end
    fn step_over(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.position += count;
        self.buffer_offset += count;

        if self.gaps.get(self.gap_cursor).is_some_and(|gap| gap.start <= self.position) || self.position >= self.end {
            self.place(self.position);
            return;
        }

        while let Some(handle) = self.chain.get(self.buffer_index) {
            if self.buffer_offset < handle.marker() {
                break;
            }
            self.buffer_index += 1;
            self.buffer_offset = 0;
        }
    }
}

impl Iterator for InputStreamView<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.step_over(1);
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let available = self.available();
        (available, Some(available))
    }
}

/// Chunks end at block boundaries, at the next gap and at the window end.
impl Buf for InputStreamView<'_> {
    fn remaining(&self) -> usize {
        self.available()
    }

    fn chunk(&self) -> &[u8] {
        if self.is_eof() {
            return &[];
        }
        let Some(handle) = self.chain.get(self.buffer_index) else {
            return &[];
        };

        let limit = match self.gaps.get(self.gap_cursor) {
            Some(gap) => gap.start.min(self.end),
            None => self.end,
        };
        let filled = &handle.filled()[self.buffer_offset..];
        let len = filled.len().min(limit - self.position);
        &filled[..len]
    }

    fn advance(&mut self, mut cnt: usize) {
        while cnt > 0 {
            let step = self.chunk().len().min(cnt);
            if step == 0 {
                break;
            }
            self.step_over(step);
            cnt -= step;
        }
    }
}

impl io::Read for InputStreamView<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let chunk = self.chunk();
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len().min(buf.len() - written);
            buf[written..written + len].copy_from_slice(&chunk[..len]);
            self.step_over(len);
            written += len;
        }
        Ok(written)
    }
}
