//! Type constraints on pool payloads (spec §4.5).

/// Types usable as pool payloads: trivially copyable and of standard
/// layout, so that raw-byte reuse within a process — and, in shared mode,
/// across processes — is sound.
///
/// Blanket-implemented for any `bytemuck::Pod` type, which is the
/// practical, checked stand-in for "trivially copyable and standard
/// layout" available from safe Rust. Types that embed process-local
/// pointers must not implement this and must only be used with
/// `Pool::create` (local mode); that obligation is on the caller, not
/// checked here, per spec §4.5.
pub trait PoolElement: bytemuck::Pod + Send {}

impl<T: bytemuck::Pod + Send> PoolElement for T {}
