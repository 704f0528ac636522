//! The pool facade: the user-visible `Pool<T>` exposing `allocate` and
//! `free`, plus the three construction modes from spec §4.2/§6.
//!
//! Grounded on `kaos/src/disruptor/mpmc/mpmc_ring_buffer.rs`'s public
//! method shape (`try_claim`/`write_slot`/`publish`/`try_read`) adapted to
//! the pool's allocate/free pointer contract, and on `kaos-ipc/src/lib.rs`'s
//! `Publisher`/`Subscriber` wrapper-over-inner-ring style for how a thin
//! facade sits over the lower-level ring/backing type.

use std::path::Path;

use crate::backing::Backing;
use crate::constants::MIN_CAPACITY;
use crate::element::PoolElement;
use crate::error::{PoolError, Result};
use crate::insights;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::slot::{self, AllocateResult, FreeResult};

/// Which kind of backing store a `Pool` owns (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingMode {
    /// Process-local heap, created and destroyed with the pool.
    Local,
    /// Named shared segment, created and owned (and unlinked at drop) by
    /// this pool.
    SharedOwner,
    /// Named shared segment mapped from an owner created elsewhere; never
    /// initializes or unlinks it.
    SharedClient,
}

/// A fixed-capacity, lock-free MPMC pool of `T`.
///
/// `allocate`/`free` never block and never return an error: allocation
/// past capacity is routed to the heap (spec §4.3), and construction is
/// the only place errors are surfaced (spec §7).
pub struct Pool<T: PoolElement> {
    backing: Backing<T>,
    mode: BackingMode,
    metrics: Metrics,
}

impl<T: PoolElement> Pool<T> {
    /// Create a process-local pool of `capacity` slots.
    ///
    /// `capacity` must be a power of two `>= 2`.
    pub fn create(capacity: usize) -> Result<Self> {
        validate_capacity(capacity)?;
        Ok(Self {
            backing: Backing::local(capacity),
            mode: BackingMode::Local,
            metrics: Metrics::new(),
        })
    }

    /// Create a named shared segment of `capacity` slots and take the
    /// owner role: this call performs the one-time initialization of
    /// sequences and counters, and the pool unlinks the segment on drop.
    pub fn create_shared(capacity: usize, name: impl AsRef<Path>) -> Result<Self> {
        validate_capacity(capacity)?;
        Ok(Self {
            backing: Backing::create_shared(name.as_ref(), capacity)?,
            mode: BackingMode::SharedOwner,
            metrics: Metrics::new(),
        })
    }

    /// Attach to an existing named shared segment as a client.
    ///
    /// Waits (bounded) for the owner's initialization handshake to
    /// complete, then maps the segment without performing any
    /// initialization writes of its own.
    pub fn attach_shared(name: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            backing: Backing::attach_shared(name.as_ref())?,
            mode: BackingMode::SharedClient,
            metrics: Metrics::new(),
        })
    }

    /// Return a pointer to uninitialized storage for one `T`, valid until
    /// the matching `free`. Never blocks, never fails: once the pool is
    /// full this routes to the default heap allocator.
    ///
    /// Zero-sized `T` never takes a slot: the payload array has zero
    /// extent for a ZST, so `free`'s pointer-range classification could
    /// never tell a slot pointer apart from a fallback one, and every
    /// call instead routes straight to the (equally zero-cost) fallback
    /// path.
    pub fn allocate(&self) -> *mut T {
        if std::mem::size_of::<T>() == 0 {
            self.metrics.record_fallback_allocation();
            insights::record_fallback_allocation();
            return crate::fallback::allocate::<T>();
        }

        match slot::try_allocate(self.backing.reserved_line(), &self.backing) {
            AllocateResult::Slot(index) => {
                self.metrics.record_pool_allocation();
                insights::record_pool_allocation(index as u32);
                self.backing.payload_ptr(index)
            }
            AllocateResult::Full => {
                self.metrics.record_fallback_allocation();
                insights::record_fallback_allocation();
                insights::record_pool_exhausted();
                crate::fallback::allocate::<T>()
            }
        }
    }

    /// Return `ptr` to the pool (or, if it is a fallback allocation,
    /// release it to the heap).
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this pool (or, in
    /// shared mode, on an attached client of it) and not already freed.
    /// Double-freeing or freeing a foreign pointer is undefined behavior,
    /// as specified in spec §4.2.
    pub unsafe fn free(&self, ptr: *mut T) {
        if self.backing.payload_range().contains(ptr) {
            let index = self.backing.index_of(ptr);
            match slot::try_free(self.backing.consumed_line(), &self.backing, index, self.capacity()) {
                FreeResult::Returned => {
                    self.metrics.record_pool_free();
                    insights::record_pool_free(index as u32);
                }
                FreeResult::NotOccupied => {
                    debug_assert!(
                        false,
                        "double free or foreign pointer on slotpool slot {index}"
                    );
                }
            }
        } else {
            self.metrics.record_fallback_free();
            insights::record_fallback_free();
            crate::fallback::free(ptr);
        }
    }

    /// The pool's fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.backing.capacity()
    }

    /// True for local and shared-owner pools; false for shared-client
    /// pools, which never initialize or unlink the segment they attach to.
    #[must_use]
    pub fn owns_backing(&self) -> bool {
        self.backing.owns_backing()
    }

    /// True for either shared mode.
    #[must_use]
    pub fn uses_shared_memory(&self) -> bool {
        self.backing.uses_shared_memory()
    }

    /// The construction mode this pool was built with.
    #[must_use]
    pub fn mode(&self) -> BackingMode {
        self.mode
    }

    /// A snapshot of this pool's allocation/free counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<T: PoolElement> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("mode", &self.mode)
            .finish()
    }
}

fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity < MIN_CAPACITY || !capacity.is_power_of_two() {
        return Err(PoolError::invalid_capacity(capacity, MIN_CAPACITY));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_enforcement() {
        for bad in [0usize, 1, 3, 6, 1000] {
            assert!(Pool::<u64>::create(bad).is_err(), "{bad} should be rejected");
        }
        for good in [2usize, 4, 8, 1024] {
            assert!(Pool::<u64>::create(good).is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    fn test_single_threaded_round_trip() {
        let pool = Pool::<u64>::create(4).unwrap();
        let p0 = pool.allocate();
        let p1 = pool.allocate();
        let p2 = pool.allocate();
        let p3 = pool.allocate();

        let mut original = vec![p0, p1, p2, p3];
        unsafe {
            pool.free(p3);
            pool.free(p2);
            pool.free(p1);
            pool.free(p0);
        }

        let mut reallocated = vec![pool.allocate(), pool.allocate(), pool.allocate(), pool.allocate()];
        original.sort();
        reallocated.sort();
        assert_eq!(original, reallocated);
    }

    #[test]
    fn test_overflow_routes_to_heap_and_back() {
        let pool = Pool::<u64>::create(2).unwrap();
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();

        assert!(pool.backing.payload_range().contains(a));
        assert!(pool.backing.payload_range().contains(b));
        assert!(!pool.backing.payload_range().contains(c));

        unsafe {
            pool.free(a);
            pool.free(b);
            pool.free(c);
        }

        let d = pool.allocate();
        let e = pool.allocate();
        assert!(pool.backing.payload_range().contains(d));
        assert!(pool.backing.payload_range().contains(e));
        unsafe {
            pool.free(d);
            pool.free(e);
        }
    }

    #[test]
    fn test_owns_backing_and_shared_flags_for_local() {
        let pool = Pool::<u64>::create(4).unwrap();
        assert!(pool.owns_backing());
        assert!(!pool.uses_shared_memory());
        assert_eq!(pool.mode(), BackingMode::Local);
    }

    #[test]
    fn test_metrics_track_pool_vs_fallback() {
        let pool = Pool::<u64>::create(2).unwrap();
        let a = pool.allocate();
        let _b = pool.allocate();
        let c = pool.allocate();

        let snap = pool.metrics();
        assert_eq!(snap.allocations_from_pool, 2);
        assert_eq!(snap.allocations_from_fallback, 1);

        unsafe {
            pool.free(a);
            pool.free(c);
        }
        let snap = pool.metrics();
        assert_eq!(snap.frees_to_pool, 1);
        assert_eq!(snap.frees_to_fallback, 1);
    }

    #[test]
    fn test_zero_sized_element_never_leaks_a_slot() {
        #[derive(Clone, Copy)]
        struct Unit;

        unsafe impl bytemuck::Zeroable for Unit {}
        unsafe impl bytemuck::Pod for Unit {}

        let pool = Pool::<Unit>::create(2).unwrap();
        for _ in 0..100 {
            let ptr = pool.allocate();
            unsafe { pool.free(ptr) };
        }

        let snap = pool.metrics();
        assert_eq!(snap.allocations_from_pool, 0, "ZSTs must never take a ring slot");
        assert_eq!(snap.allocations_from_fallback, 100);
        assert_eq!(snap.frees_to_pool, 0);
        assert_eq!(snap.frees_to_fallback, 100);
    }
}
