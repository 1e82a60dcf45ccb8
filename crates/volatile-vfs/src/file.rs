//! In-memory byte store backing one volatile file.
//!
//! A [`VolatileFile`] is shared by every descriptor opened against it. All
//! state sits behind one `RwLock`: reads take it shared, everything else
//! takes it exclusive. Nothing here blocks on anything but that lock.

use parking_lot::RwLock;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{VfsError, VfsResult};
use crate::types::{LockMode, ReadOutcome};

/// One zero-initialised shared-memory region handed to the engine.
///
/// The engine reads and writes the region through the raw pointer returned
/// by [`VolatileFile::shm_map`], so the allocation must not move while it is
/// mapped.
#[derive(Debug)]
struct ShmRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The region is plain heap memory; the engine serialises access to it with
// its own WAL-index locking.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    fn allocate(size: usize) -> VfsResult<Self> {
        let layout = Layout::from_size_align(size.max(1), 8).map_err(|_| VfsError::OutOfMemory)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(VfsError::OutOfMemory)?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[derive(Debug, Default)]
struct FileState {
    /// File content; its length is the logical file size.
    data: Vec<u8>,
    shm: Vec<ShmRegion>,
    /// Number of map calls not yet balanced by an unmap.
    shm_refcount: i64,
    /// One counter per [`LockMode`]. Unbalanced unlocks may drive these
    /// negative; the engine is trusted to pair its calls.
    locks: [i64; 5],
}

/// Content of a volatile in-memory file.
#[derive(Debug, Default)]
pub struct VolatileFile {
    state: RwLock<FileState>,
}

/// Convert an engine offset plus length to an in-memory end index.
fn end_index(offset: u64, len: usize) -> VfsResult<usize> {
    let offset = usize::try_from(offset).map_err(|_| VfsError::OutOfMemory)?;
    offset.checked_add(len).ok_or(VfsError::OutOfMemory)
}

/// Zero-extend `data` to `len` bytes, reporting allocation failure.
fn grow(data: &mut Vec<u8>, len: usize) -> VfsResult<()> {
    if len > data.len() {
        data.try_reserve_exact(len - data.len())
            .map_err(|_| VfsError::OutOfMemory)?;
        data.resize(len, 0);
    }
    Ok(())
}

impl VolatileFile {
    /// Create an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file holding `data`.
    pub fn with_contents(data: Vec<u8>) -> Self {
        Self {
            state: RwLock::new(FileState {
                data,
                ..Default::default()
            }),
        }
    }

    /// Fill `buf` from `offset`.
    ///
    /// Any part of `buf` past end of file is zeroed and the read is reported
    /// short. The engine requires the zero fill: stale bytes in a short read
    /// corrupt the database.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> ReadOutcome {
        let state = self.state.read();
        let len = state.data.len();

        let available = match usize::try_from(offset) {
            Ok(start) if start < len => {
                let n = buf.len().min(len - start);
                buf[..n].copy_from_slice(&state.data[start..start + n]);
                n
            }
            _ => 0,
        };

        if available < buf.len() {
            buf[available..].fill(0);
            ReadOutcome::Short(available)
        } else {
            ReadOutcome::Complete
        }
    }

    /// Write `data` at `offset`, zero-extending the file if needed.
    pub fn write(&self, offset: u64, data: &[u8]) -> VfsResult<()> {
        let end = end_index(offset, data.len())?;
        let mut state = self.state.write();
        grow(&mut state.data, end)?;
        state.data[end - data.len()..end].copy_from_slice(data);
        Ok(())
    }

    /// Grow with zeros or shrink to exactly `size` bytes.
    pub fn truncate(&self, size: u64) -> VfsResult<()> {
        let size = end_index(size, 0)?;
        let mut state = self.state.write();
        if size > state.data.len() {
            grow(&mut state.data, size)?;
        } else {
            state.data.truncate(size);
        }
        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.state.read().data.len() as u64
    }

    /// Copy of the whole content.
    pub fn contents(&self) -> Vec<u8> {
        self.state.read().data.clone()
    }

    /// Run `f` over the content without copying it.
    pub(crate) fn with_contents_ref<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.state.read().data)
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Increase the counter for `mode`.
    pub fn lock(&self, mode: LockMode) {
        self.state.write().locks[mode.index()] += 1;
    }

    /// Decrease the counter for `mode`.
    pub fn unlock(&self, mode: LockMode) {
        self.state.write().locks[mode.index()] -= 1;
    }

    /// Number of holders currently counted for `mode`.
    pub fn lock_count(&self, mode: LockMode) -> i64 {
        self.state.read().locks[mode.index()]
    }

    /// True if any reserved, pending or exclusive lock is held.
    pub fn check_reserved_lock(&self) -> bool {
        let state = self.state.read();
        [LockMode::Reserved, LockMode::Pending, LockMode::Exclusive]
            .iter()
            .any(|mode| state.locks[mode.index()] > 0)
    }

    // ========================================================================
    // Shared memory
    // ========================================================================

    /// Map shared-memory region `region`.
    ///
    /// Returns the existing region if already allocated. Otherwise, with
    /// `extend` set, allocates zeroed regions of `size` bytes up to and
    /// including `region`; without it, returns `None`. Every successful map
    /// bumps the reference count.
    pub fn shm_map(
        &self,
        region: usize,
        size: usize,
        extend: bool,
    ) -> VfsResult<Option<NonNull<u8>>> {
        let mut state = self.state.write();

        if let Some(existing) = state.shm.get(region) {
            let ptr = existing.ptr;
            state.shm_refcount += 1;
            return Ok(Some(ptr));
        }
        if !extend {
            return Ok(None);
        }

        let missing = region + 1 - state.shm.len();
        state
            .shm
            .try_reserve(missing)
            .map_err(|_| VfsError::OutOfMemory)?;
        let mapped = state.shm.len();
        while state.shm.len() <= region {
            match ShmRegion::allocate(size) {
                Ok(allocated) => state.shm.push(allocated),
                Err(e) => {
                    state.shm.truncate(mapped);
                    return Err(e);
                }
            }
        }
        state.shm_refcount += 1;

        Ok(Some(state.shm[region].ptr))
    }

    /// Drop one shared-memory reference, freeing every region when the
    /// count reaches zero.
    pub fn shm_unmap(&self, _delete: bool) {
        let mut state = self.state.write();
        state.shm_refcount -= 1;
        if state.shm_refcount == 0 {
            state.shm.clear();
        }
    }

    /// Current shared-memory reference count.
    pub fn shm_refcount(&self) -> i64 {
        self.state.read().shm_refcount
    }

    /// Number of allocated shared-memory regions.
    pub fn shm_regions(&self) -> usize {
        self.state.read().shm.len()
    }
}
