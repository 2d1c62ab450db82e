use std::fmt;
use std::sync::Weak;

use crate::buffer::pool::PoolInner;
use crate::buffer::{Buffer, BufferPool};
use crate::protocol::AllocError;

/// Move-only ownership of one pool block.
///
/// A handle is either vacant or holds exactly one block. Dropping a handle that
/// holds a block returns it to the pool it came from; if that pool is already gone
/// the memory is simply freed.
///
/// A vacant handle doubles as a sentinel: [`BufferHandle::vacant`] has no pool at
/// all, [`BufferHandle::deferred`] remembers its pool and acquires on [`fill`](Self::fill).
pub struct BufferHandle {
    buffer: Option<Buffer>,
    pool: Weak<PoolInner>,
}

impl BufferHandle {
    pub(crate) fn bound(buffer: Buffer, pool: Weak<PoolInner>) -> Self {
        Self { buffer: Some(buffer), pool }
    }

    /// A handle with neither block nor pool.
    pub fn vacant() -> Self {
        Self { buffer: None, pool: Weak::new() }
    }

    /// A handle bound to `pool` that has not acquired a block yet.
    pub fn deferred(pool: &BufferPool) -> Self {
        Self { buffer: None, pool: pool.downgrade() }
    }

    /// Acquires a block for a deferred handle. Does nothing when a block is already held.
    ///
    /// # Errors
    ///
    /// Fails when the pool is gone or exhausted.
    pub fn fill(&mut self) -> Result<(), AllocError> {
        if self.buffer.is_some() {
            return Ok(());
        }

        let Some(inner) = self.pool.upgrade() else {
            return Err(AllocError::PoolClosed);
        };
        let mut acquired = BufferPool::from_inner(inner).acquire()?;
        self.buffer = acquired.buffer.take();
        Ok(())
    }

    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.buffer.is_none()
    }

    #[inline]
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> Option<&mut Buffer> {
        self.buffer.as_mut()
    }

    /// Detaches the block. The caller becomes responsible for handing it back with
    /// [`BufferPool::release`].
    pub fn into_buffer(mut self) -> Option<Buffer> {
        self.buffer.take()
    }

    /// Returns the block to its pool now, leaving the handle vacant.
    pub fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release(buffer);
            }
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, Buffer::capacity)
    }

    #[inline]
    pub fn marker(&self) -> usize {
        self.buffer.as_ref().map_or(0, Buffer::marker)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.as_ref().map_or(0, Buffer::remaining)
    }

    /// Filled bytes, empty for a vacant handle.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        self.buffer.as_ref().map_or(&[], Buffer::filled)
    }

    /// Unfilled tail, empty for a vacant handle.
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.spare_mut(),
            None => &mut [],
        }
    }

    #[inline]
    pub fn advance(&mut self, count: usize) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.advance(count);
        }
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle").field("capacity", &self.capacity()).field("marker", &self.marker()).finish()
    }
}
