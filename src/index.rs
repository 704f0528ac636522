//! Cache-line-isolated index pair driving allocation and return.
//!
//! `reserved` is touched by every `allocate`, `consumed` by every `free`;
//! keeping them on separate cache lines is the whole point of splitting
//! this out from the slot control array.

use std::sync::atomic::AtomicU64;

use crate::constants::CACHE_LINE_SIZE;

/// Cache line A: the next ticket `allocate` will draw, plus the pool's
/// capacity (read-only after init, co-located so the consumer's cache
/// line stays free of producer-touched data).
#[repr(C, align(64))]
pub(crate) struct ReservedLine {
    pub reserved: AtomicU64,
    pub capacity: u32,
    _pad: [u8; CACHE_LINE_SIZE - 8 - 4],
}

impl ReservedLine {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            reserved: AtomicU64::new(0),
            capacity,
            _pad: [0; CACHE_LINE_SIZE - 8 - 4],
        }
    }
}

/// Cache line B: the next ticket `free` will draw.
#[repr(C, align(64))]
pub(crate) struct ConsumedLine {
    pub consumed: AtomicU64,
    _pad: [u8; CACHE_LINE_SIZE - 8],
}

impl ConsumedLine {
    pub(crate) fn new() -> Self {
        Self {
            consumed: AtomicU64::new(0),
            _pad: [0; CACHE_LINE_SIZE - 8],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_lines_occupy_one_cache_line() {
        assert_eq!(size_of::<ReservedLine>(), CACHE_LINE_SIZE);
        assert_eq!(size_of::<ConsumedLine>(), CACHE_LINE_SIZE);
        assert_eq!(align_of::<ReservedLine>(), CACHE_LINE_SIZE);
        assert_eq!(align_of::<ConsumedLine>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn test_capacity_is_readable_after_init() {
        let line = ReservedLine::new(1024);
        assert_eq!(line.capacity, 1024);
        assert_eq!(line.reserved.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
