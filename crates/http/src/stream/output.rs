use std::collections::VecDeque;
use std::io;

use tracing::trace;

use crate::buffer::{BufferChain, BufferHandle, BufferPool};
use crate::protocol::AllocError;

/// Write-only stream that fills pool blocks.
///
/// Each block is sealed once full and queued for the transport; [`flush`](io::Write::flush)
/// seals a partially filled block too. Writing fails with [`io::ErrorKind::OutOfMemory`]
/// when the pool stays exhausted past its retry ceiling.
///
/// [`io::Write`] acquires blocks with [`BufferPool::acquire`]. Async writers pair
/// [`reserve`](Self::reserve) with [`fill`](Self::fill) instead, so waiting for a
/// block yields to the runtime and lets the transport drain sealed blocks.
#[derive(Debug)]
pub struct OutputStreamView {
    pool: BufferPool,
    current: Option<BufferHandle>,
    completed: VecDeque<BufferHandle>,
    written: usize,
}

impl OutputStreamView {
    pub fn new(pool: BufferPool) -> Self {
        Self { pool, current: None, completed: VecDeque::new(), written: 0 }
    }

    /// Total bytes accepted so far.
    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Sealed blocks in write order, leaving the stream ready for more bytes.
    pub fn take_completed(&mut self) -> Vec<BufferHandle> {
        self.completed.drain(..).collect()
    }

    /// Seals everything written so far into a chain.
    pub fn into_chain(mut self) -> BufferChain {
        self.seal();
        let mut chain = BufferChain::new();
        for handle in self.completed.drain(..) {
            chain.push(handle);
        }
        chain
    }

    /// Makes sure a block with free space is ready for [`fill`](Self::fill).
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] when the pool stays exhausted.
    pub async fn reserve(&mut self) -> Result<(), AllocError> {
        if self.current.is_none() {
            let handle = self.pool.acquire_async().await?;
            trace!(capacity = handle.capacity(), "output stream acquired block");
            self.current = Some(handle);
        }
        Ok(())
    }

    /// Copies as much of `buf` as fits into the current block and returns the count.
    /// Writes nothing without a [`reserve`](Self::reserve)d block.
    pub fn fill(&mut self, buf: &[u8]) -> usize {
        let Some(handle) = self.current.as_mut() else {
            return 0;
        };

        let spare = handle.spare_mut();
        let len = spare.len().min(buf.len());
        spare[..len].copy_from_slice(&buf[..len]);
        handle.advance(len);
        self.written += len;

        if handle.remaining() == 0 {
            self.seal();
        }
        len
    }

    fn reserve_blocking(&mut self) -> Result<(), AllocError> {
        if self.current.is_none() {
            let handle = self.pool.acquire()?;
            trace!(capacity = handle.capacity(), "output stream acquired block");
            self.current = Some(handle);
        }
        Ok(())
    }

    fn seal(&mut self) {
        if let Some(handle) = self.current.take() {
            if handle.marker() > 0 {
                self.completed.push_back(handle);
            }
        }
    }
}

impl io::Write for OutputStreamView {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            self.reserve_blocking()?;
            let len = self.fill(rest);
            rest = &rest[len..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.seal();
        Ok(())
    }
}
