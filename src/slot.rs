//! The heart of the pool: the per-slot sequence protocol that resolves
//! concurrent reservations between allocators and freers.
//!
//! Each slot carries one `AtomicU64` sequence. For a slot selected by
//! ticket `t` (`t & mask == index`):
//! - `sequence == t`       — available for allocation.
//! - `sequence == t + 1`   — occupied (handed out, payload live).
//! - `sequence == t + capacity` — returned, ready for the next generation.
//!
//! `allocate` draws tickets from a shared `reserved` counter with a CAS
//! retry loop, as specified. `free` already knows which slot it is
//! returning (the caller derives the index from the pointer being freed),
//! so it transitions that slot directly rather than blindly walking
//! `consumed` — this is what lets frees complete in any order, not just
//! the order their matching allocations happened in.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::index::{ConsumedLine, ReservedLine};

/// Raw access to a slot's sequence atomic by index, independent of
/// whether the array backing it lives on the heap or in a mapped segment.
pub(crate) trait SlotSequences {
    fn mask(&self) -> u64;
    fn sequence(&self, index: usize) -> &AtomicU64;
}

/// Initial sequence for slot `i` (§3: "Initial value for slot i is i").
#[inline]
pub(crate) fn initial_sequence(index: usize) -> u64 {
    index as u64
}

/// Outcome of an `allocate` ticket attempt.
pub(crate) enum AllocateResult {
    /// Ticket `t` was committed; slot `t & mask`'s sequence now reads
    /// `t + 1` and its payload may be handed out.
    Slot(usize),
    /// The slot due for this ticket has not yet been returned — the pool
    /// is effectively full. Caller should fall back to the heap.
    Full,
}

/// Draw and commit the next allocation ticket.
pub(crate) fn try_allocate<S: SlotSequences>(reserved: &ReservedLine, slots: &S) -> AllocateResult {
    let mask = slots.mask();
    loop {
        let t = reserved.reserved.load(Ordering::Relaxed);
        let slot = slots.sequence((t & mask) as usize);
        let seq = slot.load(Ordering::Acquire);

        if seq == t {
            match reserved.reserved.compare_exchange_weak(
                t,
                t + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    slot.store(t + 1, Ordering::Release);
                    return AllocateResult::Slot((t & mask) as usize);
                }
                Err(_) => continue,
            }
        } else if seq < t {
            return AllocateResult::Full;
        }
        // seq > t: another producer already won this ticket; reload and retry.
    }
}

/// Outcome of a `free` attempt on a known slot index.
pub(crate) enum FreeResult {
    /// The slot transitioned from occupied to returned.
    Returned,
    /// The slot was not in the occupied state for the generation implied
    /// by its own sequence — a double free or a precondition violation.
    NotOccupied,
}

/// Return slot `index` to the pool.
///
/// `index` is derived by the caller from the pointer being freed (see
/// `backing::Backing::index_of`), not drawn from `consumed` — `consumed`
/// here is purely a returns counter kept in step with `reserved` for the
/// saturation invariant in spec §8 (S3), not a selector of which slot to
/// touch.
pub(crate) fn try_free<S: SlotSequences>(
    consumed: &ConsumedLine,
    slots: &S,
    index: usize,
    capacity: u64,
) -> FreeResult {
    let slot = slots.sequence(index);
    loop {
        let seq = slot.load(Ordering::Acquire);
        let ticket = seq.wrapping_sub(1);
        if ticket & slots.mask() != index as u64 {
            return FreeResult::NotOccupied;
        }
        match slot.compare_exchange_weak(seq, ticket + capacity, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => {
                consumed.consumed.fetch_add(1, Ordering::AcqRel);
                return FreeResult::Returned;
            }
            Err(_) => continue,
        }
    }
}
