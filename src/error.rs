//! Error types for slotpool.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("capacity {capacity} is invalid: must be a power of two >= {minimum}")]
    InvalidCapacity { capacity: usize, minimum: usize },

    #[error("failed to create shared segment {name:?}: {source}")]
    SegmentCreate { name: String, source: std::io::Error },

    #[error("failed to map shared segment {name:?}: {source}")]
    SegmentMap { name: String, source: std::io::Error },

    #[error("shared segment {name:?} does not exist")]
    SegmentNotFound { name: String },

    #[error("timed out waiting for owner to initialize shared segment {name:?}")]
    HandshakeTimeout { name: String },

    #[error(
        "shared segment {name:?} (capacity={capacity}) layout mismatch: file holds element size={file_slot_size} align={file_slot_align}, attaching type has size={expected_slot_size} align={expected_slot_align}"
    )]
    LayoutMismatch {
        name: String,
        capacity: usize,
        file_slot_size: usize,
        file_slot_align: usize,
        expected_slot_size: usize,
        expected_slot_align: usize,
    },
}

impl PoolError {
    pub fn invalid_capacity(capacity: usize, minimum: usize) -> Self {
        Self::InvalidCapacity { capacity, minimum }
    }

    pub fn segment_create(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::SegmentCreate { name: name.into(), source }
    }

    pub fn segment_map(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::SegmentMap { name: name.into(), source }
    }

    pub fn segment_not_found(name: impl Into<String>) -> Self {
        Self::SegmentNotFound { name: name.into() }
    }

    pub fn handshake_timeout(name: impl Into<String>) -> Self {
        Self::HandshakeTimeout { name: name.into() }
    }
}
