//! Filesystem-level engine entry points (`sqlite3_vfs`).

use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::ffi;
use std::ffi::CStr;
use std::str::Utf8Error;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::io_methods::{IO_METHODS, VolatileFileHandle};
use super::status;
use crate::namespace::VolatileVfs;
use crate::registry;
use crate::types::{InstanceId, OpenFlags};

/// Julian day number of the Unix epoch, in milliseconds.
const UNIX_EPOCH_JULIAN_MS: i64 = 24_405_875 * 8_640_000;

const MS_PER_DAY: f64 = 86_400_000.0;

const DL_ERROR: &[u8] = b"Loadable extensions are not supported";

/// Instance id carried in the VFS's app data.
///
/// # Safety
///
/// `p_vfs` must be a VFS registered by [`super::Registration`].
unsafe fn instance_id(p_vfs: *mut ffi::sqlite3_vfs) -> InstanceId {
    // SAFETY: guaranteed by caller.
    let app_data = unsafe { (*p_vfs).pAppData };
    InstanceId(app_data as usize as u32)
}

/// # Safety
///
/// `p_vfs` must be a VFS registered by [`super::Registration`].
unsafe fn namespace(p_vfs: *mut ffi::sqlite3_vfs) -> Option<Arc<VolatileVfs>> {
    // SAFETY: guaranteed by caller.
    let id = unsafe { instance_id(p_vfs) };
    let found = registry::lookup(id).map(|instance| Arc::clone(&instance.vfs));
    if found.is_none() {
        tracing::warn!(%id, "call on unknown volatile file system");
    }
    found
}

/// Owned copy of a possibly-null C string. Names that are not valid
/// UTF-8 are rejected so distinct engine names never share a key.
///
/// # Safety
///
/// `z` must be null or point to a NUL-terminated string.
unsafe fn name_arg(z: *const c_char) -> Result<Option<String>, Utf8Error> {
    if z.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by caller.
    let name = unsafe { CStr::from_ptr(z) };
    Ok(Some(name.to_str()?.to_owned()))
}

/// Copy `src` into an engine buffer of `n_out` bytes, NUL terminated.
///
/// Returns false (leaving the buffer untouched) if it does not fit.
///
/// # Safety
///
/// `z_out` must be writable for `n_out` bytes.
unsafe fn copy_to_buffer(src: &[u8], n_out: c_int, z_out: *mut c_char) -> bool {
    let Ok(n_out) = usize::try_from(n_out) else {
        return false;
    };
    if z_out.is_null() || src.len() >= n_out {
        return false;
    }
    // SAFETY: src.len() + 1 <= n_out bytes are writable.
    unsafe {
        ptr::copy_nonoverlapping(src.as_ptr(), z_out.cast::<u8>(), src.len());
        *z_out.add(src.len()) = 0;
    }
    true
}

/// Milliseconds since the Julian epoch.
fn julian_now_ms() -> i64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    UNIX_EPOCH_JULIAN_MS + since_unix.as_millis() as i64
}

pub(super) unsafe extern "C" fn x_open(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    p_file: *mut ffi::sqlite3_file,
    flags: c_int,
    p_out_flags: *mut c_int,
) -> c_int {
    // A null method table tells the engine not to call xClose.
    // SAFETY: the engine passes a szOsFile-sized file struct.
    unsafe { (*p_file).pMethods = ptr::null() };

    // SAFETY: p_vfs is ours; z_name is null or NUL terminated.
    let (id, vfs, name) = unsafe { (instance_id(p_vfs), namespace(p_vfs), name_arg(z_name)) };
    let Some(vfs) = vfs else {
        return status::CANTOPEN;
    };
    let Ok(name) = name else {
        tracing::debug!(%id, "open with non-UTF-8 name");
        return status::CANTOPEN;
    };

    let fd = match vfs.open(name.as_deref(), OpenFlags::from_sqlite(flags)) {
        Ok(fd) => fd,
        Err(e) => {
            tracing::debug!(%id, name = ?name, error = %e, "open failed");
            return status::open(&e);
        }
    };

    // SAFETY: the engine allocated szOsFile = size_of::<VolatileFileHandle>() bytes.
    unsafe {
        ptr::write(
            p_file.cast::<VolatileFileHandle>(),
            VolatileFileHandle {
                base: ffi::sqlite3_file {
                    pMethods: &IO_METHODS,
                },
                instance: id,
                fd,
            },
        );
        if !p_out_flags.is_null() {
            *p_out_flags = flags;
        }
    }
    status::OK
}

pub(super) unsafe extern "C" fn x_delete(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    _sync_dir: c_int,
) -> c_int {
    // SAFETY: p_vfs is ours; z_name is null or NUL terminated.
    let (vfs, name) = unsafe { (namespace(p_vfs), name_arg(z_name)) };
    let (Some(vfs), Ok(Some(name))) = (vfs, name) else {
        return status::IOERR_DELETE_NOENT;
    };
    match vfs.delete(&name) {
        Ok(()) => status::OK,
        Err(e) => status::delete(&e),
    }
}

pub(super) unsafe extern "C" fn x_access(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    _flags: c_int,
    p_res_out: *mut c_int,
) -> c_int {
    // SAFETY: p_vfs is ours; z_name is null or NUL terminated.
    let (vfs, name) = unsafe { (namespace(p_vfs), name_arg(z_name)) };
    let Some(vfs) = vfs else {
        return status::IOERR_FSTAT;
    };
    let exists = matches!(name, Ok(Some(name)) if vfs.access(&name));
    // SAFETY: the engine passes a valid out pointer.
    unsafe { *p_res_out = c_int::from(exists) };
    status::OK
}

/// Paths are used verbatim.
pub(super) unsafe extern "C" fn x_full_pathname(
    _p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    if z_name.is_null() {
        return status::CANTOPEN;
    }
    // SAFETY: z_name is NUL terminated; z_out holds n_out bytes.
    let copied = unsafe {
        let name = CStr::from_ptr(z_name).to_bytes();
        copy_to_buffer(name, n_out, z_out)
    };
    if copied { status::OK } else { status::CANTOPEN }
}

pub(super) unsafe extern "C" fn x_dl_open(
    _p_vfs: *mut ffi::sqlite3_vfs,
    _z_filename: *const c_char,
) -> *mut c_void {
    ptr::null_mut()
}

pub(super) unsafe extern "C" fn x_dl_error(
    _p_vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_err_msg: *mut c_char,
) {
    let Ok(n) = usize::try_from(n_byte) else {
        return;
    };
    if n == 0 || z_err_msg.is_null() {
        return;
    }
    let len = DL_ERROR.len().min(n - 1);
    // SAFETY: z_err_msg holds n_byte bytes and len < n_byte.
    unsafe { copy_to_buffer(&DL_ERROR[..len], n_byte, z_err_msg) };
}

pub(super) unsafe extern "C" fn x_dl_close(_p_vfs: *mut ffi::sqlite3_vfs, _handle: *mut c_void) {}

pub(super) unsafe extern "C" fn x_randomness(
    _p_vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    let Ok(n) = usize::try_from(n_byte) else {
        return 0;
    };
    if n == 0 || z_out.is_null() {
        return 0;
    }
    // SAFETY: the engine passes a writable buffer of n_byte bytes.
    let buf = unsafe { std::slice::from_raw_parts_mut(z_out.cast::<u8>(), n) };
    OsRng.fill_bytes(buf);
    n_byte
}

/// Real sleep, so the engine's busy-retry loop paces itself.
pub(super) unsafe extern "C" fn x_sleep(_p_vfs: *mut ffi::sqlite3_vfs, microseconds: c_int) -> c_int {
    let micros = u64::try_from(microseconds).unwrap_or(0);
    thread::sleep(Duration::from_micros(micros));
    microseconds
}

pub(super) unsafe extern "C" fn x_current_time(
    _p_vfs: *mut ffi::sqlite3_vfs,
    p_now: *mut f64,
) -> c_int {
    // SAFETY: the engine passes a valid out pointer.
    unsafe { *p_now = julian_now_ms() as f64 / MS_PER_DAY };
    status::OK
}

pub(super) unsafe extern "C" fn x_current_time_int64(
    _p_vfs: *mut ffi::sqlite3_vfs,
    p_now: *mut ffi::sqlite3_int64,
) -> c_int {
    // SAFETY: the engine passes a valid out pointer.
    unsafe { *p_now = julian_now_ms() };
    status::OK
}

pub(super) unsafe extern "C" fn x_get_last_error(
    p_vfs: *mut ffi::sqlite3_vfs,
    _n_byte: c_int,
    _z_err_msg: *mut c_char,
) -> c_int {
    // SAFETY: p_vfs is ours.
    match unsafe { namespace(p_vfs) } {
        Some(vfs) => vfs.last_error(),
        None => status::IOERR,
    }
}
