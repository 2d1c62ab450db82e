//! Byte streams layered over pool blocks.
//!
//! [`InputStreamView`] reads a window of a request's [`BufferChain`](crate::buffer::BufferChain)
//! while skipping [`Gap`]s; [`OutputStreamView`] accumulates response bytes into pool
//! blocks and hands full blocks to the transport.

mod input;
mod output;

pub use input::Gap;
pub use input::InputStreamView;
pub use output::OutputStreamView;
