use crate::buffer::BufferHandle;

/// Ordered sequence of pool blocks holding the bytes of one request or response.
///
/// Bytes are addressed by absolute offset: offset 0 is the first filled byte of the
/// first block and every block contributes exactly its filled prefix. Blocks may be
/// attached before they are full, so block boundaries are not multiples of the
/// block size.
#[derive(Debug, Default)]
pub struct BufferChain {
    handles: Vec<BufferHandle>,
}

impl BufferChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block. Vacant handles carry no bytes and are dropped.
    pub fn push(&mut self, handle: BufferHandle) {
        if !handle.is_vacant() {
            self.handles.push(handle);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&BufferHandle> {
        self.handles.get(index)
    }

    #[inline]
    pub fn last_mut(&mut self) -> Option<&mut BufferHandle> {
        self.handles.last_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferHandle> {
        self.handles.iter()
    }

    /// Filled bytes across all blocks.
    pub fn total_len(&self) -> usize {
        self.handles.iter().map(BufferHandle::marker).sum()
    }

    /// Finds the block and intra-block offset holding absolute byte `index`.
    ///
    /// A linear scan: chains are bounded by request size over block size.
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut base = 0;
        for (position, handle) in self.handles.iter().enumerate() {
            let len = handle.marker();
            if index < base + len {
                return Some((position, index - base));
            }
            base += len;
        }
        None
    }

    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.locate(index).map(|(buffer, offset)| self.handles[buffer].filled()[offset])
    }

    /// Copies `[start, stop)` out of the chain, ignoring any part past the end.
    pub fn copy_range(&self, start: usize, stop: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(stop.saturating_sub(start));
        let mut base = 0;
        for handle in &self.handles {
            let filled = handle.filled();
            let block_end = base + filled.len();
            if block_end > start && base < stop {
                let from = start.saturating_sub(base);
                let to = (stop - base).min(filled.len());
                out.extend_from_slice(&filled[from..to]);
            }
            if block_end >= stop {
                break;
            }
            base = block_end;
        }
        out
    }

    /// Returns every block to the pool.
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::buffer::testing::chain_of;
    use crate::config::PoolConfig;

    fn pool() -> BufferPool {
        BufferPool::new(&PoolConfig { block_size: 8, initial_blocks: 0, max_blocks: 0, ..PoolConfig::default() })
    }

    #[test]
    fn locate_follows_fill_markers() {
        let pool = pool();
        let chain = chain_of(&pool, &[b"abc", b"defgh", b"", b"ij"]);

        assert_eq!(chain.len(), 4);
        assert_eq!(chain.total_len(), 10);
        assert_eq!(chain.locate(0), Some((0, 0)));
        assert_eq!(chain.locate(2), Some((0, 2)));
        assert_eq!(chain.locate(3), Some((1, 0)));
        assert_eq!(chain.locate(8), Some((3, 0)));
        assert_eq!(chain.locate(10), None);
        assert_eq!(chain.byte_at(9), Some(b'j'));
    }

    #[test]
    fn copy_range_spans_blocks() {
        let pool = pool();
        let chain = chain_of(&pool, &[b"abc", b"defgh", b"ij"]);

        assert_eq!(chain.copy_range(1, 9), b"bcdefghi");
        assert_eq!(chain.copy_range(3, 8), b"defgh");
        assert_eq!(chain.copy_range(8, 20), b"ij");
        assert!(chain.copy_range(4, 4).is_empty());
    }

    #[test]
    fn vacant_handles_are_not_chained() {
        let mut chain = BufferChain::new();
        chain.push(BufferHandle::vacant());
        assert!(chain.is_empty());
    }

    #[test]
    fn clear_returns_blocks() {
        let pool = pool();
        let mut chain = chain_of(&pool, &[b"abc", b"def"]);
        assert_eq!(pool.stats().borrowed, 2);
        chain.clear();
        assert_eq!(pool.stats().borrowed, 0);
    }
}
