use std::error::Error;
use std::io;
use thiserror::Error;

/// Error a [`Dispatcher`](crate::handler::Dispatcher) may return; it becomes a 500 stock response.
pub type DispatchError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("allocation error: {source}")]
    Alloc {
        #[from]
        source: AllocError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl HttpError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("buffer pool exhausted after {retries} retries, max blocks {max_blocks}")]
    Exhausted { retries: u32, max_blocks: usize },

    #[error("buffer pool has been dropped")]
    PoolClosed,
}

impl From<AllocError> for io::Error {
    fn from(e: AllocError) -> Self {
        io::Error::new(io::ErrorKind::OutOfMemory, e)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid percent escape at byte {position}")]
    InvalidEscape { position: usize },
}
