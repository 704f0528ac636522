//! Pool sizing and layout constants.

/// Minimum allowed capacity (a pool of 1 slot cannot distinguish producer
/// and consumer turns on the same ticket).
pub const MIN_CAPACITY: usize = 2;

/// A representative mid-range capacity exercised by the benchmarks.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Typical hardware cache line size, used to isolate `reserved` from
/// `consumed` and to size the shared-segment header.
pub const CACHE_LINE_SIZE: usize = 64;

/// Number of cache lines reserved for the shared-segment header
/// (magic/version/capacity/state line + reserved line + consumed line).
pub const SHARED_HEADER_CACHE_LINES: usize = 3;

/// Shared-segment header size in bytes.
pub const SHARED_HEADER_SIZE: usize = SHARED_HEADER_CACHE_LINES * CACHE_LINE_SIZE;

/// Bounded number of spins a client performs waiting for the owner's
/// initialization handshake before giving up.
pub const HANDSHAKE_SPIN_LIMIT: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_is_power_of_two() {
        assert!(DEFAULT_CAPACITY.is_power_of_two());
    }

    #[test]
    fn test_header_size_is_cache_aligned() {
        assert_eq!(SHARED_HEADER_SIZE % CACHE_LINE_SIZE, 0);
    }
}
