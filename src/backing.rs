//! Backing store: a process-local heap region or a named, file-backed
//! `MAP_SHARED` segment, both laid out as one contiguous block holding the
//! index pair, the slot control array, and the payload array.
//!
//! Grounded on the teacher's `SharedRingBuffer` (file-backed mmap via
//! `libc`, header magic/version validated in `open()`, `munmap` in
//! `Drop`), generalized from a single SPSC sequence pair to the pool's
//! full index-pair-plus-slot-array layout, and with the magic/version
//! fields promoted to real atomics so the owner/client handshake can be
//! given the acquire/release ordering spec.md §4.4 requires (the teacher's
//! own header used plain, unordered reads for this).

use std::fs::OpenOptions;
use std::io;
use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::constants::{CACHE_LINE_SIZE, HANDSHAKE_SPIN_LIMIT, SHARED_HEADER_SIZE};
use crate::element::PoolElement;
use crate::error::{PoolError, Result};
use crate::index::{ConsumedLine, ReservedLine};
use crate::slot::{initial_sequence, SlotSequences};

const MAGIC: u64 = 0x534c4f545f504f4c; // "SLOT_POL"
const FORMAT_VERSION: u32 = 1;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Unlinked = 3,
}

/// Cache line 0 of a shared segment: the owner/client handshake fields.
/// `magic` is the single publication edge — it is written last by the
/// owner with `Release` ordering and spun on by clients with `Acquire`.
#[repr(C, align(64))]
struct MetaLine {
    magic: AtomicU64,
    version: u32,
    state: AtomicU32,
    slot_size: u32,
    slot_align: u32,
    _pad: [u8; CACHE_LINE_SIZE - 8 - 4 - 4 - 4 - 4],
}

impl MetaLine {
    fn zeroed() -> Self {
        Self {
            magic: AtomicU64::new(0),
            version: 0,
            state: AtomicU32::new(SegmentState::Uninitialized as u32),
            slot_size: 0,
            slot_align: 0,
            _pad: [0; CACHE_LINE_SIZE - 8 - 4 - 4 - 4 - 4],
        }
    }
}

/// Header of a local (in-process) backing: just the index pair, no
/// handshake metadata is needed since there is never more than one
/// initializer.
#[repr(C)]
struct LocalHeader {
    reserved_line: ReservedLine,
    consumed_line: ConsumedLine,
}

/// Header of a shared segment: handshake metadata, then the index pair —
/// three cache lines total (`constants::SHARED_HEADER_CACHE_LINES`).
#[repr(C)]
struct SharedHeader {
    meta: MetaLine,
    reserved_line: ReservedLine,
    consumed_line: ConsumedLine,
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte layout of the backing region, shared by local and shared modes.
struct SegmentLayout {
    slot_array_offset: usize,
    payload_offset: usize,
    total_size: usize,
}

impl SegmentLayout {
    fn compute(header_size: usize, capacity: usize, elem_size: usize, elem_align: usize) -> Self {
        let slot_array_offset = header_size;
        let slot_array_size = capacity * std::mem::size_of::<AtomicU64>();
        let payload_offset = round_up(slot_array_offset + slot_array_size, elem_align.max(1));
        let payload_size = capacity * elem_size;
        let total_size = payload_offset + payload_size;
        Self { slot_array_offset, payload_offset, total_size }
    }
}

/// A pointer-range classifier over the payload array's extent.
#[derive(Clone, Copy)]
pub(crate) struct PayloadRange {
    base: usize,
    end: usize,
}

impl PayloadRange {
    #[inline]
    pub(crate) fn contains<T>(&self, ptr: *const T) -> bool {
        let addr = ptr as usize;
        addr >= self.base && addr < self.end
    }
}

pub(crate) struct LocalBacking<T: PoolElement> {
    ptr: *mut u8,
    alloc_layout: std::alloc::Layout,
    layout: SegmentLayout,
    capacity: usize,
    _phantom: PhantomData<T>,
}

impl<T: PoolElement> LocalBacking<T> {
    fn new(capacity: usize) -> Self {
        let header_size = std::mem::size_of::<LocalHeader>();
        let layout = SegmentLayout::compute(
            header_size,
            capacity,
            std::mem::size_of::<T>(),
            std::mem::align_of::<T>(),
        );
        let align = CACHE_LINE_SIZE.max(std::mem::align_of::<T>());
        let alloc_layout = std::alloc::Layout::from_size_align(layout.total_size, align)
            .expect("pool segment layout is valid");

        let ptr = unsafe { std::alloc::alloc_zeroed(alloc_layout) };
        assert!(!ptr.is_null(), "allocation failed for local pool backing");

        unsafe {
            let header = ptr as *mut LocalHeader;
            std::ptr::write(
                std::ptr::addr_of_mut!((*header).reserved_line),
                ReservedLine::new(capacity as u32),
            );
            std::ptr::write(std::ptr::addr_of_mut!((*header).consumed_line), ConsumedLine::new());

            let slot_array = ptr.add(layout.slot_array_offset) as *mut AtomicU64;
            for i in 0..capacity {
                std::ptr::write(slot_array.add(i), AtomicU64::new(initial_sequence(i)));
            }
        }

        Self { ptr, alloc_layout, layout, capacity, _phantom: PhantomData }
    }

    fn header(&self) -> &LocalHeader {
        unsafe { &*(self.ptr as *const LocalHeader) }
    }

    fn slot_array(&self) -> *mut AtomicU64 {
        unsafe { self.ptr.add(self.layout.slot_array_offset) as *mut AtomicU64 }
    }

    fn payload_base(&self) -> *mut T {
        unsafe { self.ptr.add(self.layout.payload_offset) as *mut T }
    }
}

impl<T: PoolElement> Drop for LocalBacking<T> {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.alloc_layout) };
    }
}

unsafe impl<T: PoolElement> Send for LocalBacking<T> {}
unsafe impl<T: PoolElement> Sync for LocalBacking<T> {}

pub(crate) struct SharedBacking<T: PoolElement> {
    mmap_ptr: *mut u8,
    mmap_len: usize,
    layout: SegmentLayout,
    capacity: usize,
    is_owner: bool,
    name: PathBuf,
    _file: std::fs::File,
    _phantom: PhantomData<T>,
}

impl<T: PoolElement> SharedBacking<T> {
    fn header(&self) -> &SharedHeader {
        unsafe { &*(self.mmap_ptr as *const SharedHeader) }
    }

    fn slot_array(&self) -> *mut AtomicU64 {
        unsafe { self.mmap_ptr.add(self.layout.slot_array_offset) as *mut AtomicU64 }
    }

    fn payload_base(&self) -> *mut T {
        unsafe { self.mmap_ptr.add(self.layout.payload_offset) as *mut T }
    }

    fn map_file(file: &std::fs::File, len: usize) -> io::Result<*mut u8> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(ptr as *mut u8)
    }

    fn create(name: &Path, capacity: usize) -> Result<Self> {
        let layout = SegmentLayout::compute(
            SHARED_HEADER_SIZE,
            capacity,
            std::mem::size_of::<T>(),
            std::mem::align_of::<T>(),
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(name)
            .map_err(|e| PoolError::segment_create(name.to_string_lossy(), e))?;
        file.set_len(layout.total_size as u64)
            .map_err(|e| PoolError::segment_create(name.to_string_lossy(), e))?;

        let mmap_ptr = Self::map_file(&file, layout.total_size)
            .map_err(|e| PoolError::segment_map(name.to_string_lossy(), e))?;

        unsafe {
            std::ptr::write_bytes(mmap_ptr, 0, layout.total_size);

            let header = mmap_ptr as *mut SharedHeader;
            std::ptr::write(std::ptr::addr_of_mut!((*header).meta), MetaLine::zeroed());
            std::ptr::write(
                std::ptr::addr_of_mut!((*header).reserved_line),
                ReservedLine::new(capacity as u32),
            );
            std::ptr::write(std::ptr::addr_of_mut!((*header).consumed_line), ConsumedLine::new());

            let meta = std::ptr::addr_of_mut!((*header).meta);
            (*meta).version = FORMAT_VERSION;
            (*meta).slot_size = std::mem::size_of::<T>() as u32;
            (*meta).slot_align = std::mem::align_of::<T>() as u32;
            (*meta).state.store(SegmentState::Initializing as u32, Ordering::Relaxed);

            let slot_array = mmap_ptr.add(layout.slot_array_offset) as *mut AtomicU64;
            for i in 0..capacity {
                std::ptr::write(slot_array.add(i), AtomicU64::new(initial_sequence(i)));
            }

            libc::msync(mmap_ptr as *mut _, layout.total_size, libc::MS_SYNC);

            // Publish: state then magic, both release, magic last as the
            // handshake's single synchronization edge.
            (*meta).state.store(SegmentState::Ready as u32, Ordering::Release);
            (*meta).magic.store(MAGIC, Ordering::Release);
        }

        Ok(Self {
            mmap_ptr,
            mmap_len: layout.total_size,
            layout,
            capacity,
            is_owner: true,
            name: name.to_path_buf(),
            _file: file,
            _phantom: PhantomData,
        })
    }

    fn open(name: &Path) -> Result<Self> {
        if !name.exists() {
            return Err(PoolError::segment_not_found(name.to_string_lossy()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(name)
            .map_err(|_| PoolError::segment_not_found(name.to_string_lossy()))?;

        let file_len = file
            .metadata()
            .map_err(|e| PoolError::segment_map(name.to_string_lossy(), e))?
            .len() as usize;

        let mmap_ptr =
            Self::map_file(&file, file_len).map_err(|e| PoolError::segment_map(name.to_string_lossy(), e))?;

        let header = mmap_ptr as *const SharedHeader;
        let meta = unsafe { &(*header).meta };

        let mut spins = 0;
        loop {
            if meta.magic.load(Ordering::Acquire) == MAGIC {
                break;
            }
            spins += 1;
            if spins >= HANDSHAKE_SPIN_LIMIT {
                unsafe { libc::munmap(mmap_ptr as *mut _, file_len) };
                return Err(PoolError::handshake_timeout(name.to_string_lossy()));
            }
            std::hint::spin_loop();
        }

        let capacity = unsafe { (*header).reserved_line.capacity as usize };
        let expected_size = std::mem::size_of::<T>() as usize;
        let expected_align = std::mem::align_of::<T>() as usize;
        let (file_size, file_align) = (meta.slot_size as usize, meta.slot_align as usize);

        if meta.version != FORMAT_VERSION || file_size != expected_size || file_align != expected_align {
            unsafe { libc::munmap(mmap_ptr as *mut _, file_len) };
            return Err(PoolError::LayoutMismatch {
                name: name.to_string_lossy().into_owned(),
                capacity,
                file_slot_size: file_size,
                file_slot_align: file_align,
                expected_slot_size: expected_size,
                expected_slot_align: expected_align,
            });
        }

        let layout = SegmentLayout::compute(SHARED_HEADER_SIZE, capacity, expected_size, expected_align);

        Ok(Self {
            mmap_ptr,
            mmap_len: file_len,
            layout,
            capacity,
            is_owner: false,
            name: name.to_path_buf(),
            _file: file,
            _phantom: PhantomData,
        })
    }
}

impl<T: PoolElement> Drop for SharedBacking<T> {
    fn drop(&mut self) {
        if self.is_owner {
            self.header().meta.state.store(SegmentState::Unlinked as u32, Ordering::Release);
            let _ = std::fs::remove_file(&self.name);
        }
        unsafe { libc::munmap(self.mmap_ptr as *mut _, self.mmap_len) };
    }
}

unsafe impl<T: PoolElement> Send for SharedBacking<T> {}
unsafe impl<T: PoolElement> Sync for SharedBacking<T> {}

/// A pool's storage: either process-local or a mapped shared segment.
pub(crate) enum Backing<T: PoolElement> {
    Local(LocalBacking<T>),
    Shared(SharedBacking<T>),
}

impl<T: PoolElement> Backing<T> {
    pub(crate) fn local(capacity: usize) -> Self {
        Self::Local(LocalBacking::new(capacity))
    }

    pub(crate) fn create_shared(name: &Path, capacity: usize) -> Result<Self> {
        Ok(Self::Shared(SharedBacking::create(name, capacity)?))
    }

    pub(crate) fn attach_shared(name: &Path) -> Result<Self> {
        Ok(Self::Shared(SharedBacking::open(name)?))
    }

    pub(crate) fn capacity(&self) -> u64 {
        match self {
            Self::Local(l) => l.capacity as u64,
            Self::Shared(s) => s.capacity as u64,
        }
    }

    pub(crate) fn reserved_line(&self) -> &ReservedLine {
        match self {
            Self::Local(l) => &l.header().reserved_line,
            Self::Shared(s) => &s.header().reserved_line,
        }
    }

    pub(crate) fn consumed_line(&self) -> &ConsumedLine {
        match self {
            Self::Local(l) => &l.header().consumed_line,
            Self::Shared(s) => &s.header().consumed_line,
        }
    }

    fn slot_array_ptr(&self) -> *mut AtomicU64 {
        match self {
            Self::Local(l) => l.slot_array(),
            Self::Shared(s) => s.slot_array(),
        }
    }

    pub(crate) fn payload_base(&self) -> *mut T {
        match self {
            Self::Local(l) => l.payload_base(),
            Self::Shared(s) => s.payload_base(),
        }
    }

    pub(crate) fn payload_ptr(&self, index: usize) -> *mut T {
        unsafe { self.payload_base().add(index) }
    }

    pub(crate) fn payload_range(&self) -> PayloadRange {
        let base = self.payload_base() as usize;
        let end = base + self.capacity() as usize * std::mem::size_of::<T>();
        PayloadRange { base, end }
    }

    /// Index of the slot a pointer into the payload array belongs to.
    ///
    /// # Safety
    /// `ptr` must lie within `self.payload_range()`.
    pub(crate) fn index_of(&self, ptr: *const T) -> usize {
        let base = self.payload_base() as usize;
        let addr = ptr as usize;
        (addr - base) / std::mem::size_of::<T>()
    }

    pub(crate) fn owns_backing(&self) -> bool {
        match self {
            Self::Local(_) => true,
            Self::Shared(s) => s.is_owner,
        }
    }

    pub(crate) fn uses_shared_memory(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

impl<T: PoolElement> SlotSequences for Backing<T> {
    fn mask(&self) -> u64 {
        self.capacity() - 1
    }

    fn sequence(&self, index: usize) -> &AtomicU64 {
        unsafe { &*self.slot_array_ptr().add(index) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{try_allocate, try_free, AllocateResult, FreeResult};

    #[test]
    fn test_shared_header_matches_its_declared_size() {
        assert_eq!(std::mem::size_of::<SharedHeader>(), SHARED_HEADER_SIZE);
    }

    #[test]
    fn test_local_backing_layout_and_round_trip() {
        let backing: Backing<u64> = Backing::local(4);
        assert_eq!(backing.capacity(), 4);
        assert!(backing.owns_backing());
        assert!(!backing.uses_shared_memory());

        let index = match try_allocate(backing.reserved_line(), &backing) {
            AllocateResult::Slot(i) => i,
            AllocateResult::Full => panic!("fresh pool should not be full"),
        };
        let ptr = backing.payload_ptr(index);
        unsafe { ptr.write(7) };
        assert!(backing.payload_range().contains(ptr));
        assert_eq!(backing.index_of(ptr), index);

        match try_free(backing.consumed_line(), &backing, index, 4) {
            FreeResult::Returned => {}
            FreeResult::NotOccupied => panic!("slot should have been occupied"),
        }
    }

    #[test]
    fn test_create_and_attach_shared_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotpool-test.seg");

        let owner: Backing<u64> = Backing::create_shared(&path, 8).expect("create_shared");
        assert!(owner.owns_backing());
        assert!(owner.uses_shared_memory());

        let client: Backing<u64> = Backing::attach_shared(&path).expect("attach_shared");
        assert!(!client.owns_backing());
        assert_eq!(client.capacity(), 8);

        let index = match try_allocate(owner.reserved_line(), &owner) {
            AllocateResult::Slot(i) => i,
            AllocateResult::Full => panic!("fresh shared pool should not be full"),
        };
        unsafe { owner.payload_ptr(index).write(42) };

        // The client observes the owner's write at the same offset.
        let seen = unsafe { *client.payload_ptr(index) };
        assert_eq!(seen, 42);

        drop(owner);
        drop(client);
    }

    #[test]
    fn test_attach_without_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotpool-test-missing.seg");

        let result: Result<Backing<u64>> = Backing::attach_shared(&path);
        assert!(matches!(result, Err(PoolError::SegmentNotFound { .. })));
    }
}
