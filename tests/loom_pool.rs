//! Model-checked test of the slot ticket protocol under `loom`'s
//! exhaustive interleaving exploration.
//!
//! The teacher crate carries `loom` as a `cfg(loom)` dev-dependency but
//! does not ship a committed loom test of its own; this one is built
//! directly from spec.md §4.1/§8's invariants (no duplicate allocation,
//! no lost frees) using loom's atomics in place of `std`'s, which is the
//! standard way to loom-test a hand-rolled lock-free structure.
//!
//! Run: RUSTFLAGS="--cfg loom" cargo test --test loom_pool --release

#![cfg(loom)]

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::thread;

/// A minimal two-producer, capacity-2 re-implementation of the slot
/// ticket protocol using loom's atomics, so loom can explore every
/// interleaving of the CAS retry loop. This intentionally duplicates the
/// shape of `slot::try_allocate`/`slot::try_free` rather than reusing
/// them directly, since those are written against `std::sync::atomic`
/// and loom requires its own drop-in atomic types to instrument
/// concurrent access.
struct Slots {
    reserved: AtomicU64,
    consumed: AtomicU64,
    sequence: [AtomicU64; 2],
}

impl Slots {
    fn new() -> Self {
        Self {
            reserved: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            sequence: [AtomicU64::new(0), AtomicU64::new(1)],
        }
    }

    fn try_allocate(&self) -> Option<usize> {
        loop {
            let t = self.reserved.load(Ordering::Relaxed);
            let idx = (t & 1) as usize;
            let seq = self.sequence[idx].load(Ordering::Acquire);

            if seq == t {
                if self
                    .reserved
                    .compare_exchange(t, t + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    self.sequence[idx].store(t + 1, Ordering::Release);
                    return Some(idx);
                }
            } else if seq < t {
                return None;
            }
        }
    }

    fn free(&self, idx: usize) {
        loop {
            let seq = self.sequence[idx].load(Ordering::Acquire);
            let ticket = seq.wrapping_sub(1);
            if ticket & 1 != idx as u64 {
                return;
            }
            if self.sequence[idx]
                .compare_exchange(seq, ticket + 2, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.consumed.fetch_add(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

#[test]
fn loom_two_producers_never_double_allocate() {
    loom::model(|| {
        let slots = loom::sync::Arc::new(Slots::new());

        let s1 = slots.clone();
        let t1 = thread::spawn(move || s1.try_allocate());

        let s2 = slots.clone();
        let t2 = thread::spawn(move || s2.try_allocate());

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        // Capacity 2, only two slots ever exist: both threads may win a
        // distinct slot, but they must never win the same one.
        if let (Some(a), Some(b)) = (r1, r2) {
            assert_ne!(a, b, "two producers must not receive the same slot");
        }

        if let Some(idx) = r1 {
            slots.free(idx);
        }
        if let Some(idx) = r2 {
            slots.free(idx);
        }
    });
}

#[test]
fn loom_allocate_then_free_is_reusable() {
    loom::model(|| {
        let slots = loom::sync::Arc::new(Slots::new());

        let idx = slots.try_allocate().expect("first allocation must succeed");
        let s = slots.clone();
        let freer = thread::spawn(move || s.free(idx));
        freer.join().unwrap();

        // After the matching free is visible, the same slot must be
        // allocatable again in the next generation.
        let again = slots.try_allocate();
        assert!(again.is_some());
    });
}
