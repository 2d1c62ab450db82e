//! Fixed-size block allocator backing every request and response buffer.
//!
//! The pool hands out [`BufferHandle`]s, each owning exactly one block. Blocks come
//! back to the free list when the handle is dropped, so memory use is bounded by
//! `block_size * max_blocks` no matter how many connections are active.
//!
//! When the pool is at capacity, [`BufferPool::acquire`] retries with a bounded
//! spin-then-sleep backoff before giving up with [`AllocError`]. That failure is
//! fatal for the request that asked, never for the process.

use std::collections::HashSet;
use std::hint;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::buffer::BufferHandle;
use crate::config::{PoolConfig, RetryPolicy};
use crate::protocol::AllocError;

/// A block of pool memory with a fill marker.
///
/// The backing storage is never reallocated, so its address identifies the block
/// for as long as it lives. `0 <= marker <= capacity` always holds.
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    marker: usize,
}

impl Buffer {
    fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0u8; capacity].into_boxed_slice(), marker: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes filled so far.
    #[inline]
    pub fn marker(&self) -> usize {
        self.marker
    }

    /// Moves the fill marker, clamped to the capacity.
    #[inline]
    pub fn set_marker(&mut self, marker: usize) {
        self.marker = marker.min(self.capacity());
    }

    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.set_marker(self.marker.saturating_add(count));
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.marker
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.marker == self.capacity()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.marker = 0;
    }

    /// The filled part of the block.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.marker]
    }

    /// The unfilled tail of the block, where the next read or write lands.
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.marker..]
    }

    #[inline]
    fn id(&self) -> usize {
        self.data.as_ptr().addr()
    }
}

/// Point-in-time counters of a [`BufferPool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub block_size: usize,
    pub max_blocks: usize,
    pub free: usize,
    pub borrowed: usize,
}

impl PoolStats {
    /// Blocks the pool currently owns, whether lent out or not.
    pub fn total(&self) -> usize {
        self.free + self.borrowed
    }
}

/// Thread-safe pool of equally sized buffers.
///
/// Cloning is cheap and every clone refers to the same blocks. The pool is meant to
/// be created once per server and passed to whoever needs buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    block_size: usize,
    max_blocks: usize,
    retry: RetryPolicy,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<Buffer>,
    borrowed: HashSet<usize>,
}

impl BufferPool {
    /// Creates a pool from `config`.
    ///
    /// Block ids are block addresses, and empty boxed slices all share one address,
    /// so a `block_size` of zero is raised to one.
    pub fn new(config: &PoolConfig) -> Self {
        let block_size = if config.block_size == 0 {
            warn!("buffer pool block size is zero, using 1");
            1
        } else {
            config.block_size
        };
        let initial = if config.max_blocks == 0 { config.initial_blocks } else { config.initial_blocks.min(config.max_blocks) };

        let free = (0..initial).map(|_| Buffer::with_capacity(block_size)).collect::<Vec<_>>();
        trace!(block_size, initial_blocks = initial, max_blocks = config.max_blocks, "created buffer pool");

        Self {
            inner: Arc::new(PoolInner {
                block_size,
                max_blocks: config.max_blocks,
                retry: config.retry.clone(),
                state: Mutex::new(PoolState { free, borrowed: HashSet::with_capacity(initial) }),
            }),
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            block_size: self.inner.block_size,
            max_blocks: self.inner.max_blocks,
            free: state.free.len(),
            borrowed: state.borrowed.len(),
        }
    }

    /// Borrows a block, blocking the calling thread with bounded backoff while the
    /// pool is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] once the retry ceiling is reached.
    pub fn acquire(&self) -> Result<BufferHandle, AllocError> {
        let mut backoff = Backoff::new(&self.inner.retry);
        loop {
            if let Some(buffer) = self.inner.try_acquire() {
                return Ok(self.bind(buffer));
            }

            match backoff.next() {
                Some(Pause::Spin) => {
                    hint::spin_loop();
                    thread::yield_now();
                }
                Some(Pause::Sleep(duration)) => thread::sleep(duration),
                None => return Err(self.exhausted()),
            }
        }
    }

    /// Same as [`acquire`](Self::acquire) but yields to the tokio runtime instead of
    /// parking the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] once the retry ceiling is reached.
    pub async fn acquire_async(&self) -> Result<BufferHandle, AllocError> {
        let mut backoff = Backoff::new(&self.inner.retry);
        loop {
            if let Some(buffer) = self.inner.try_acquire() {
                return Ok(self.bind(buffer));
            }

            match backoff.next() {
                Some(Pause::Spin) => tokio::task::yield_now().await,
                Some(Pause::Sleep(duration)) => tokio::time::sleep(duration).await,
                None => return Err(self.exhausted()),
            }
        }
    }

    /// Non-blocking variant, `None` when the pool is at capacity.
    pub fn try_acquire(&self) -> Option<BufferHandle> {
        self.inner.try_acquire().map(|buffer| self.bind(buffer))
    }

    /// Returns a block to the free list.
    ///
    /// A block of the wrong size, or one this pool did not lend out, is logged and
    /// dropped. Both are caller bugs and never surface as errors.
    pub fn release(&self, buffer: Buffer) {
        self.inner.release(buffer);
    }

    pub(crate) fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<PoolInner> {
        Arc::downgrade(&self.inner)
    }

    fn bind(&self, buffer: Buffer) -> BufferHandle {
        BufferHandle::bound(buffer, self.downgrade())
    }

    fn exhausted(&self) -> AllocError {
        error!(max_blocks = self.inner.max_blocks, retries = self.inner.retry.max_attempts, "buffer pool exhausted");
        AllocError::Exhausted { retries: self.inner.retry.max_attempts, max_blocks: self.inner.max_blocks }
    }
}

impl PoolInner {
    fn try_acquire(&self) -> Option<Buffer> {
        let mut state = self.state.lock();

        let buffer = match state.free.pop() {
            Some(buffer) => buffer,
            None if self.max_blocks == 0 || state.borrowed.len() < self.max_blocks => Buffer::with_capacity(self.block_size),
            None => return None,
        };

        state.borrowed.insert(buffer.id());
        Some(buffer)
    }

    pub(crate) fn release(&self, mut buffer: Buffer) {
        if buffer.capacity() != self.block_size {
            error!(expected = self.block_size, actual = buffer.capacity(), "released buffer size mismatch, dropping it");
            return;
        }

        let mut state = self.state.lock();
        if !state.borrowed.remove(&buffer.id()) {
            error!("released buffer was not borrowed from this pool, ignoring it");
            return;
        }

        buffer.clear();
        state.free.push(buffer);
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.borrowed.is_empty() {
            error!(outstanding = state.borrowed.len(), "buffer pool dropped while buffers are still borrowed");
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pause {
    Spin,
    Sleep(Duration),
}

/// Spin a few times, then sleep in growing steps up to a cap, then give up.
#[derive(Debug)]
struct Backoff<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
}

impl<'a> Backoff<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }
}

impl Iterator for Backoff<'_> {
    type Item = Pause;

    fn next(&mut self) -> Option<Self::Item> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;

        if self.attempt <= self.policy.spin_attempts {
            return Some(Pause::Spin);
        }

        let step = u64::from(self.attempt - self.policy.spin_attempts);
        let micros = self.policy.sleep_step_micros.saturating_mul(step).min(self.policy.max_sleep_micros);
        Some(Pause::Sleep(Duration::from_micros(micros)))
    }
}
