//! Engine status codes and error translation.
//!
//! Extended I/O codes are built the way `sqlite3.h` defines them:
//! `SQLITE_IOERR | (n << 8)`.

use rusqlite::ffi;
use std::os::raw::c_int;

use crate::error::VfsError;

pub const OK: c_int = ffi::SQLITE_OK;
pub const ERROR: c_int = ffi::SQLITE_ERROR;
pub const NOMEM: c_int = ffi::SQLITE_NOMEM;
pub const NOTFOUND: c_int = ffi::SQLITE_NOTFOUND;
pub const CANTOPEN: c_int = ffi::SQLITE_CANTOPEN;
pub const IOERR: c_int = ffi::SQLITE_IOERR;

pub const IOERR_READ: c_int = IOERR | (1 << 8);
pub const IOERR_SHORT_READ: c_int = IOERR | (2 << 8);
pub const IOERR_WRITE: c_int = IOERR | (3 << 8);
pub const IOERR_TRUNCATE: c_int = IOERR | (6 << 8);
pub const IOERR_FSTAT: c_int = IOERR | (7 << 8);
pub const IOERR_DELETE: c_int = IOERR | (10 << 8);
pub const IOERR_CLOSE: c_int = IOERR | (16 << 8);
pub const IOERR_SHMMAP: c_int = IOERR | (21 << 8);
pub const IOERR_DELETE_NOENT: c_int = IOERR | (23 << 8);

/// Status for a failed `xOpen`.
pub fn open(err: &VfsError) -> c_int {
    match err {
        VfsError::OutOfMemory => NOMEM,
        _ => CANTOPEN,
    }
}

/// Status for a failed `xDelete`.
pub fn delete(err: &VfsError) -> c_int {
    match err {
        VfsError::NotFound(_) => IOERR_DELETE_NOENT,
        _ => IOERR_DELETE,
    }
}

/// Status for a failed data operation; `fallback` is the operation's own
/// I/O code.
pub fn io(err: &VfsError, fallback: c_int) -> c_int {
    match err {
        VfsError::OutOfMemory => NOMEM,
        VfsError::UnknownLockMode(_) => ERROR,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_codes_match_engine() {
        assert_eq!(IOERR_SHORT_READ, 522);
        assert_eq!(IOERR_DELETE, 2570);
        assert_eq!(IOERR_CLOSE, 4106);
        assert_eq!(IOERR_DELETE_NOENT, 5898);
        assert_eq!(IOERR_FSTAT, 1802);
    }

    #[test]
    fn test_open_status() {
        assert_eq!(open(&VfsError::not_found("a")), CANTOPEN);
        assert_eq!(open(&VfsError::already_exists("a")), CANTOPEN);
        assert_eq!(open(&VfsError::OutOfMemory), NOMEM);
    }

    #[test]
    fn test_delete_status() {
        assert_eq!(delete(&VfsError::not_found("a")), IOERR_DELETE_NOENT);
        assert_eq!(delete(&VfsError::busy("a")), IOERR_DELETE);
    }

    #[test]
    fn test_io_status() {
        assert_eq!(io(&VfsError::OutOfMemory, IOERR_WRITE), NOMEM);
        assert_eq!(io(&VfsError::UnknownLockMode(9), IOERR), ERROR);
        assert_eq!(io(&VfsError::BadDescriptor(1), IOERR_TRUNCATE), IOERR_TRUNCATE);
    }
}
