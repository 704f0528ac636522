//! Insights - observability for slotpool.
//!
//! Unified tracing spans over pool operations. Zero-cost when disabled.
//!
//! # Usage
//!
//! ```toml
//! slotpool = { version = "0.1", features = ["tracing"] }
//! ```
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Record an allocation served directly from the pool.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_pool_allocation(slot: u32) {
    let _span = tracing::trace_span!("pool_alloc", slot).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_pool_allocation(_slot: u32) {}

/// Record an allocation that overflowed to the heap fallback.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_fallback_allocation() {
    let _span = tracing::debug_span!("fallback_alloc").entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_fallback_allocation() {}

/// Record a free returned to a pool slot.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_pool_free(slot: u32) {
    let _span = tracing::trace_span!("pool_free", slot).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_pool_free(_slot: u32) {}

/// Record a free of a fallback (heap) allocation.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_fallback_free() {
    let _span = tracing::debug_span!("fallback_free").entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_fallback_free() {}

/// Record the pool running out of free slots (about to fall back).
#[cfg(feature = "tracing")]
#[inline]
pub fn record_pool_exhausted() {
    let _span = tracing::warn_span!("pool_exhausted").entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_pool_exhausted() {}

/// Create a span for a shared-segment attach/create.
#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! span_segment {
    ($name:expr) => {
        tracing::info_span!("segment", name = %$name)
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! span_segment {
    ($name:expr) => {
        ()
    };
}

/// Enter a span (no-op when tracing disabled).
#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! enter_span {
    ($span:expr) => {
        let _guard = $span.enter();
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! enter_span {
    ($span:expr) => {};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insights_compile() {
        record_pool_allocation(0);
        record_fallback_allocation();
        record_pool_free(0);
        record_fallback_free();
        record_pool_exhausted();
    }
}
