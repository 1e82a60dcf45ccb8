//! SQLite binding for the volatile file system.
//!
//! Each entry point resolves the instance (and, for file methods, the
//! descriptor), calls into [`VolatileVfs`] or [`VolatileFile`], and maps the
//! outcome to a status code. All behaviour lives in the namespace and byte
//! store.
//!
//! - `vfs_methods` - `sqlite3_vfs` callbacks (open, delete, access, ...)
//! - `io_methods` - `sqlite3_io_methods` callbacks (read, write, lock, shm)
//! - [`status`] - status codes and error translation
//!
//! [`VolatileVfs`]: crate::namespace::VolatileVfs
//! [`VolatileFile`]: crate::file::VolatileFile

mod io_methods;
pub mod status;
mod vfs_methods;

use rusqlite::ffi;
use std::ffi::CString;
use std::fmt;
use std::mem;
use std::os::raw::{c_int, c_void};

use crate::config::VolatileConfig;
use crate::error::{VfsError, VfsResult};
use crate::types::InstanceId;
use io_methods::VolatileFileHandle;

/// A `sqlite3_vfs` registered with the engine.
///
/// The engine keeps raw pointers to both the struct and its name, so they
/// are boxed and must outlive the registration.
pub(crate) struct Registration {
    vfs: Box<ffi::sqlite3_vfs>,
    name: CString,
}

// The struct is only read by the engine, which synchronises VFS list
// access internally.
unsafe impl Send for Registration {}
unsafe impl Sync for Registration {}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Registration {
    /// Register a VFS named `name` whose callbacks resolve instance `id`.
    pub(crate) fn register(
        name: &str,
        id: InstanceId,
        config: &VolatileConfig,
    ) -> VfsResult<Self> {
        let name = CString::new(name)
            .map_err(|_| VfsError::InvalidConfig(format!("VFS name contains NUL: {name:?}")))?;

        // SAFETY: sqlite3_vfs is plain data; all-zero is null pointers and
        // absent callbacks.
        let mut vfs: Box<ffi::sqlite3_vfs> = Box::new(unsafe { mem::zeroed() });
        vfs.iVersion = 2;
        vfs.szOsFile = mem::size_of::<VolatileFileHandle>() as c_int;
        vfs.mxPathname = config.max_pathname;
        vfs.zName = name.as_ptr();
        vfs.pAppData = id.0 as usize as *mut c_void;
        vfs.xOpen = Some(vfs_methods::x_open);
        vfs.xDelete = Some(vfs_methods::x_delete);
        vfs.xAccess = Some(vfs_methods::x_access);
        vfs.xFullPathname = Some(vfs_methods::x_full_pathname);
        // xDlSym stays unset: x_dl_open never returns a handle to look up.
        vfs.xDlOpen = Some(vfs_methods::x_dl_open);
        vfs.xDlError = Some(vfs_methods::x_dl_error);
        vfs.xDlClose = Some(vfs_methods::x_dl_close);
        vfs.xRandomness = Some(vfs_methods::x_randomness);
        vfs.xSleep = Some(vfs_methods::x_sleep);
        vfs.xCurrentTime = Some(vfs_methods::x_current_time);
        vfs.xGetLastError = Some(vfs_methods::x_get_last_error);
        vfs.xCurrentTimeInt64 = Some(vfs_methods::x_current_time_int64);

        // SAFETY: vfs and name are heap allocations owned by the returned
        // Registration, which unregisters before freeing them.
        let rc = unsafe { ffi::sqlite3_vfs_register(&mut *vfs, c_int::from(config.make_default)) };
        if rc != status::OK {
            return Err(VfsError::Registration(rc));
        }

        Ok(Self { vfs, name })
    }

    /// Remove from the engine and free.
    pub(crate) fn unregister(mut self) {
        // SAFETY: registered in `register`; no open files reference it.
        unsafe { ffi::sqlite3_vfs_unregister(&mut *self.vfs) };
    }

    /// Remove from the engine but never free, for when open files still
    /// point at the struct.
    pub(crate) fn leak(mut self) {
        // SAFETY: registered in `register`.
        unsafe { ffi::sqlite3_vfs_unregister(&mut *self.vfs) };
        mem::forget(self);
    }
}
