//! slotpool - a fixed-capacity, lock-free, multi-producer multi-consumer
//! object pool for low-latency allocation of trivially copyable objects.
//!
//! The pool is backed by either process-local heap memory or a named,
//! file-backed shared-memory segment, with a single owner responsible for
//! one-time initialization and any number of clients free to attach. See
//! [`Pool`] for the public API.
//!
//! ```
//! use slotpool::Pool;
//!
//! let pool = Pool::<u64>::create(4).unwrap();
//! let ptr = pool.allocate();
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!     pool.free(ptr);
//! }
//! ```

mod backing;
pub mod constants;
mod element;
pub mod error;
mod fallback;
mod index;
pub mod insights;
pub mod metrics;
mod slot;

mod facade;

pub use element::PoolElement;
pub use error::{PoolError, Result};
pub use facade::{BackingMode, Pool};
