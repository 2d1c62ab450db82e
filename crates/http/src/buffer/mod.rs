//! Pool-backed memory for all connection I/O.
//!
//! - [`BufferPool`]: bounded allocator of equally sized blocks, shared by all connections
//! - [`BufferHandle`]: move-only ownership of one block, returned to the pool on drop
//! - [`BufferChain`]: the ordered blocks holding one request, addressed by absolute offset
//!
//! Nothing here copies request bytes around: the parser records offsets into the
//! chain and the stream views in [`crate::stream`] read straight out of the blocks.

mod chain;
mod handle;
mod pool;

pub use chain::BufferChain;
pub use handle::BufferHandle;
pub use pool::Buffer;
pub use pool::BufferPool;
pub use pool::PoolStats;

#[cfg(test)]
pub(crate) mod testing {
    use super::{BufferChain, BufferPool};
    use crate::config::PoolConfig;

    pub(crate) fn pool(block_size: usize) -> BufferPool {
        BufferPool::new(&PoolConfig { block_size, initial_blocks: 0, max_blocks: 0, ..PoolConfig::default() })
    }

    /// One block per piece, each filled with exactly that piece.
    pub(crate) fn chain_of(pool: &BufferPool, pieces: &[&[u8]]) -> BufferChain {
        let mut chain = BufferChain::new();
        for piece in pieces {
            let mut handle = pool.acquire().unwrap();
            handle.spare_mut()[..piece.len()].copy_from_slice(piece);
            handle.advance(piece.len());
            chain.push(handle);
        }
        chain
    }

    /// Splits `bytes` over as many full blocks as needed.
    pub(crate) fn chain_from(pool: &BufferPool, bytes: &[u8]) -> BufferChain {
        let pieces = bytes.chunks(pool.block_size()).collect::<Vec<_>>();
        chain_of(pool, &pieces)
    }
}
