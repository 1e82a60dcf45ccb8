//! Per-file engine entry points (`sqlite3_io_methods`).
//!
//! Each function resolves the instance and descriptor stored in the
//! engine's file struct, delegates to the [`VolatileFile`], and translates
//! the result into a status code.

use rusqlite::ffi;
use std::os::raw::{c_int, c_void};
use std::slice;
use std::sync::Arc;

use super::status;
use crate::file::VolatileFile;
use crate::registry::{self, Instance};
use crate::types::{Descriptor, InstanceId, LockMode, ReadOutcome};

/// Engine file struct for a volatile file. The engine allocates
/// `szOsFile` bytes and treats the leading `base` as its own.
#[repr(C)]
pub(crate) struct VolatileFileHandle {
    pub(crate) base: ffi::sqlite3_file,
    pub(crate) instance: InstanceId,
    pub(crate) fd: Descriptor,
}

pub(crate) static IO_METHODS: ffi::sqlite3_io_methods = ffi::sqlite3_io_methods {
    iVersion: 2,
    xClose: Some(x_close),
    xRead: Some(x_read),
    xWrite: Some(x_write),
    xTruncate: Some(x_truncate),
    xSync: Some(x_sync),
    xFileSize: Some(x_file_size),
    xLock: Some(x_lock),
    xUnlock: Some(x_unlock),
    xCheckReservedLock: Some(x_check_reserved_lock),
    xFileControl: Some(x_file_control),
    xSectorSize: Some(x_sector_size),
    xDeviceCharacteristics: Some(x_device_characteristics),
    xShmMap: Some(x_shm_map),
    xShmLock: Some(x_shm_lock),
    xShmBarrier: Some(x_shm_barrier),
    xShmUnmap: Some(x_shm_unmap),
    xFetch: None,
    xUnfetch: None,
};

/// Instance and descriptor stored in `p_file`.
///
/// # Safety
///
/// `p_file` must point to a handle initialised by `x_open`.
unsafe fn handle_ids(p_file: *mut ffi::sqlite3_file) -> (InstanceId, Descriptor) {
    // SAFETY: guaranteed by caller.
    let handle = unsafe { &*p_file.cast::<VolatileFileHandle>() };
    (handle.instance, handle.fd)
}

fn instance(id: InstanceId) -> Result<Arc<Instance>, c_int> {
    registry::lookup(id).ok_or_else(|| {
        tracing::warn!(%id, "file call on unknown volatile file system");
        status::IOERR
    })
}

/// Resolve the file behind `p_file`, or the status to return.
///
/// # Safety
///
/// `p_file` must point to a handle initialised by `x_open`.
unsafe fn resolve(p_file: *mut ffi::sqlite3_file) -> Result<Arc<VolatileFile>, c_int> {
    // SAFETY: guaranteed by caller.
    let (id, fd) = unsafe { handle_ids(p_file) };
    instance(id)?
        .vfs
        .file_by_fd(fd)
        .map_err(|_| status::IOERR)
}

/// Unwrap a resolution result inside an entry point.
macro_rules! try_resolve {
    ($p_file:expr) => {
        // SAFETY: the engine only calls io methods on files opened by x_open.
        match unsafe { resolve($p_file) } {
            Ok(file) => file,
            Err(rc) => return rc,
        }
    };
}

unsafe extern "C" fn x_close(p_file: *mut ffi::sqlite3_file) -> c_int {
    // SAFETY: the engine only closes files opened by x_open.
    let (id, fd) = unsafe { handle_ids(p_file) };
    let Ok(instance) = instance(id) else {
        return status::IOERR_CLOSE;
    };
    match instance.vfs.close(fd) {
        Ok(()) => status::OK,
        Err(_) => status::IOERR_CLOSE,
    }
}

unsafe extern "C" fn x_read(
    p_file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    amount: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let file = try_resolve!(p_file);
    let (Ok(amount), Ok(offset)) = (usize::try_from(amount), u64::try_from(offset)) else {
        return status::IOERR_READ;
    };
    // SAFETY: the engine passes a writable buffer of `amount` bytes.
    let buf = unsafe { slice::from_raw_parts_mut(buf.cast::<u8>(), amount) };

    tracing::trace!(offset, amount, "read");
    match file.read(offset, buf) {
        ReadOutcome::Complete => status::OK,
        ReadOutcome::Short(_) => status::IOERR_SHORT_READ,
    }
}

unsafe extern "C" fn x_write(
    p_file: *mut ffi::sqlite3_file,
    buf: *const c_void,
    amount: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let file = try_resolve!(p_file);
    let (Ok(amount), Ok(offset)) = (usize::try_from(amount), u64::try_from(offset)) else {
        return status::IOERR_WRITE;
    };
    // SAFETY: the engine passes a readable buffer of `amount` bytes.
    let data = unsafe { slice::from_raw_parts(buf.cast::<u8>(), amount) };

    tracing::trace!(offset, amount, "write");
    match file.write(offset, data) {
        Ok(()) => status::OK,
        Err(e) => status::io(&e, status::IOERR_WRITE),
    }
}

unsafe extern "C" fn x_truncate(p_file: *mut ffi::sqlite3_file, size: ffi::sqlite3_int64) -> c_int {
    let file = try_resolve!(p_file);
    let Ok(size) = u64::try_from(size) else {
        return status::IOERR_TRUNCATE;
    };

    tracing::trace!(size, "truncate");
    match file.truncate(size) {
        Ok(()) => status::OK,
        Err(e) => status::io(&e, status::IOERR_TRUNCATE),
    }
}

unsafe extern "C" fn x_sync(_p_file: *mut ffi::sqlite3_file, _flags: c_int) -> c_int {
    status::OK
}

unsafe extern "C" fn x_file_size(
    p_file: *mut ffi::sqlite3_file,
    p_size: *mut ffi::sqlite3_int64,
) -> c_int {
    let file = try_resolve!(p_file);
    let Ok(size) = ffi::sqlite3_int64::try_from(file.size()) else {
        return status::IOERR_FSTAT;
    };
    // SAFETY: the engine passes a valid out pointer.
    unsafe { *p_size = size };
    status::OK
}

unsafe extern "C" fn x_lock(p_file: *mut ffi::sqlite3_file, mode: c_int) -> c_int {
    let file = try_resolve!(p_file);
    match LockMode::try_from(mode) {
        Ok(mode) => {
            tracing::trace!(?mode, "lock");
            file.lock(mode);
            status::OK
        }
        Err(e) => status::io(&e, status::ERROR),
    }
}

unsafe extern "C" fn x_unlock(p_file: *mut ffi::sqlite3_file, mode: c_int) -> c_int {
    let file = try_resolve!(p_file);
    match LockMode::try_from(mode) {
        Ok(mode) => {
            tracing::trace!(?mode, "unlock");
            file.unlock(mode);
            status::OK
        }
        Err(e) => status::io(&e, status::ERROR),
    }
}

unsafe extern "C" fn x_check_reserved_lock(
    p_file: *mut ffi::sqlite3_file,
    p_res_out: *mut c_int,
) -> c_int {
    let file = try_resolve!(p_file);
    // SAFETY: the engine passes a valid out pointer.
    unsafe { *p_res_out = c_int::from(file.check_reserved_lock()) };
    status::OK
}

/// No file controls are implemented; `SQLITE_NOTFOUND` lets the engine
/// handle pragmas and everything else itself.
unsafe extern "C" fn x_file_control(
    _p_file: *mut ffi::sqlite3_file,
    _op: c_int,
    _arg: *mut c_void,
) -> c_int {
    status::NOTFOUND
}

unsafe extern "C" fn x_sector_size(p_file: *mut ffi::sqlite3_file) -> c_int {
    // SAFETY: the engine only calls io methods on files opened by x_open.
    let (id, _) = unsafe { handle_ids(p_file) };
    registry::lookup(id).map_or(0, |instance| instance.config.sector_size)
}

unsafe extern "C" fn x_device_characteristics(_p_file: *mut ffi::sqlite3_file) -> c_int {
    0
}

unsafe extern "C" fn x_shm_map(
    p_file: *mut ffi::sqlite3_file,
    region: c_int,
    size: c_int,
    extend: c_int,
    pp: *mut *mut c_void,
) -> c_int {
    let file = try_resolve!(p_file);
    let (Ok(region), Ok(size)) = (usize::try_from(region), usize::try_from(size)) else {
        return status::IOERR_SHMMAP;
    };

    match file.shm_map(region, size, extend != 0) {
        Ok(mapped) => {
            let ptr = mapped.map_or(std::ptr::null_mut(), |p| p.as_ptr().cast::<c_void>());
            // SAFETY: the engine passes a valid out pointer.
            unsafe { *pp = ptr };
            status::OK
        }
        Err(e) => status::io(&e, status::IOERR_SHMMAP),
    }
}

/// Shared-memory locks only matter between processes, which this VFS does
/// not support.
unsafe extern "C" fn x_shm_lock(
    _p_file: *mut ffi::sqlite3_file,
    _offset: c_int,
    _n: c_int,
    _flags: c_int,
) -> c_int {
    status::OK
}

/// The engine is built with mutexes, which already act as barriers.
unsafe extern "C" fn x_shm_barrier(_p_file: *mut ffi::sqlite3_file) {}

unsafe extern "C" fn x_shm_unmap(p_file: *mut ffi::sqlite3_file, delete_flag: c_int) -> c_int {
    let file = try_resolve!(p_file);
    file.shm_unmap(delete_flag != 0);
    status::OK
}
