//! Namespace of volatile files and their open descriptors.
//!
//! Thread-safe via an internal `RwLock`: open, close and delete take it
//! exclusive, lookups take it shared. Each [`VolatileFile`] carries its own
//! lock, so I/O on two different files never contends here beyond the
//! lookup.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::{VfsError, VfsResult};
use crate::file::VolatileFile;
use crate::types::{Descriptor, OpenFlags};

/// Prefix of names generated for anonymous (engine temp) files.
const TEMP_PREFIX: &str = "volatile-temp-";

/// Descriptor table entry.
#[derive(Debug)]
struct OpenFile {
    name: String,
    file: Arc<VolatileFile>,
    delete_on_close: bool,
}

#[derive(Debug, Default)]
struct Tables {
    files: HashMap<String, Arc<VolatileFile>>,
    fds: HashMap<Descriptor, OpenFile>,
    /// Next descriptor number, increasing monotonically.
    serial: u64,
    /// Next anonymous file number.
    temp_serial: u64,
}

impl Tables {
    fn is_open(&self, file: &Arc<VolatileFile>) -> bool {
        self.fds.values().any(|open| Arc::ptr_eq(&open.file, file))
    }
}

/// In-memory namespace mapping file names and descriptors to files.
#[derive(Debug, Default)]
pub struct VolatileVfs {
    tables: RwLock<Tables>,
    /// Last POSIX error recorded by a failing call.
    errno: AtomicI32,
}

impl VolatileVfs {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `err` as the last error and hand it back.
    fn fail(&self, err: VfsError) -> VfsError {
        self.errno.store(err.errno(), Ordering::Relaxed);
        err
    }

    /// Open `name`, creating it if `flags` allow.
    ///
    /// An exclusive create of an existing name fails with `AlreadyExists`;
    /// opening a missing name without create fails with `NotFound`. `None`
    /// opens a fresh anonymous file.
    pub fn open(&self, name: Option<&str>, flags: OpenFlags) -> VfsResult<Descriptor> {
        let mut tables = self.tables.write();

        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let generated = format!("{TEMP_PREFIX}{}", tables.temp_serial);
                tables.temp_serial += 1;
                generated
            }
        };

        // SQLITE_OPEN_EXCLUSIVE pairs with SQLITE_OPEN_CREATE like O_EXCL
        // with O_CREAT: create, and fail if the name exists.
        let file = match tables.files.get(&name) {
            Some(_) if flags.exclusive => {
                return Err(self.fail(VfsError::already_exists(name)));
            }
            Some(file) => Arc::clone(file),
            None if !flags.create => {
                return Err(self.fail(VfsError::not_found(name)));
            }
            None => {
                let file = Arc::new(VolatileFile::new());
                tables.files.insert(name.clone(), Arc::clone(&file));
                file
            }
        };

        let fd = Descriptor(tables.serial);
        tables.serial += 1;
        tracing::debug!(%fd, name = %name, "open volatile file");
        tables.fds.insert(
            fd,
            OpenFile {
                name,
                file,
                delete_on_close: flags.delete_on_close,
            },
        );

        Ok(fd)
    }

    /// Release `fd`.
    ///
    /// The file itself stays in the namespace unless it was opened
    /// delete-on-close and this was its last descriptor.
    pub fn close(&self, fd: Descriptor) -> VfsResult<()> {
        let mut tables = self.tables.write();

        let open = tables
            .fds
            .remove(&fd)
            .ok_or_else(|| self.fail(VfsError::BadDescriptor(fd.0)))?;
        tracing::debug!(%fd, name = %open.name, "close volatile file");

        if open.delete_on_close && !tables.is_open(&open.file) {
            let same = tables
                .files
                .get(&open.name)
                .is_some_and(|file| Arc::ptr_eq(file, &open.file));
            if same {
                tables.files.remove(&open.name);
                tracing::debug!(name = %open.name, "deleted on close");
            }
        }

        Ok(())
    }

    /// Remove `name` from the namespace.
    ///
    /// Fails with `Busy` while any descriptor references the file.
    pub fn delete(&self, name: &str) -> VfsResult<()> {
        let mut tables = self.tables.write();

        let file = tables
            .files
            .get(name)
            .ok_or_else(|| self.fail(VfsError::not_found(name)))?;

        if tables.is_open(file) {
            return Err(self.fail(VfsError::busy(name)));
        }

        tables.files.remove(name);
        tracing::debug!(name, "delete volatile file");
        Ok(())
    }

    /// True if `name` exists. Records `ENOENT` when it does not.
    pub fn access(&self, name: &str) -> bool {
        let tables = self.tables.read();
        if tables.files.contains_key(name) {
            true
        } else {
            self.errno.store(libc::ENOENT, Ordering::Relaxed);
            false
        }
    }

    /// Last recorded POSIX error number (0 if none).
    pub fn last_error(&self) -> c_int {
        self.errno.load(Ordering::Relaxed)
    }

    /// File behind an open descriptor.
    pub fn file_by_fd(&self, fd: Descriptor) -> VfsResult<Arc<VolatileFile>> {
        let tables = self.tables.read();
        tables
            .fds
            .get(&fd)
            .map(|open| Arc::clone(&open.file))
            .ok_or_else(|| self.fail(VfsError::BadDescriptor(fd.0)))
    }

    /// File registered under `name`.
    ///
    /// A missing name fails with `NotFound` but records `EBADF`, the same
    /// last error as an unknown descriptor.
    pub fn file_by_name(&self, name: &str) -> VfsResult<Arc<VolatileFile>> {
        let tables = self.tables.read();
        tables.files.get(name).cloned().ok_or_else(|| {
            self.errno.store(libc::EBADF, Ordering::Relaxed);
            VfsError::not_found(name)
        })
    }

    /// Create `name` holding `data`. Fails if it already exists.
    pub fn create_with_contents(&self, name: &str, data: Vec<u8>) -> VfsResult<()> {
        let mut tables = self.tables.write();
        if tables.files.contains_key(name) {
            return Err(self.fail(VfsError::already_exists(name)));
        }
        tables
            .files
            .insert(name.to_string(), Arc::new(VolatileFile::with_contents(data)));
        tracing::debug!(name, "create volatile file");
        Ok(())
    }

    /// Sorted names of all files.
    pub fn file_names(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut names: Vec<String> = tables.files.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of open descriptors.
    pub fn open_count(&self) -> usize {
        self.tables.read().fds.len()
    }

    /// Run `f` over every (name, file) pair while holding the namespace
    /// lock, stopping at the first error.
    pub(crate) fn try_for_each_file(
        &self,
        mut f: impl FnMut(&str, &VolatileFile) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let tables = self.tables.read();
        for (name, file) in tables.files.iter() {
            f(name, file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_create_and_lookup() {
        let vfs = VolatileVfs::new();
        let fd = vfs.open(Some("test.db"), OpenFlags::create()).unwrap();

        let file = vfs.file_by_fd(fd).unwrap();
        file.write(0, b"data").unwrap();

        let by_name = vfs.file_by_name("test.db").unwrap();
        assert!(Arc::ptr_eq(&file, &by_name));
        assert_eq!(by_name.contents(), b"data");
    }

    #[test]
    fn test_open_missing_without_create() {
        let vfs = VolatileVfs::new();
        let err = vfs.open(Some("missing"), OpenFlags::existing()).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert_eq!(vfs.last_error(), libc::ENOENT);
    }

    #[test]
    fn test_open_exclusive_existing() {
        let vfs = VolatileVfs::new();
        vfs.open(Some("a"), OpenFlags::create()).unwrap();

        let err = vfs.open(Some("a"), OpenFlags::create_exclusive()).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
        assert_eq!(vfs.last_error(), libc::EEXIST);
    }

    #[test]
    fn test_descriptors_increase_monotonically() {
        let vfs = VolatileVfs::new();
        let a = vfs.open(Some("a"), OpenFlags::create()).unwrap();
        let b = vfs.open(Some("a"), OpenFlags::existing()).unwrap();
        vfs.close(b).unwrap();
        let c = vfs.open(Some("a"), OpenFlags::existing()).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_close_unknown_descriptor() {
        let vfs = VolatileVfs::new();
        let err = vfs.close(Descriptor(99)).unwrap_err();
        assert!(matches!(err, VfsError::BadDescriptor(99)));
        assert_eq!(vfs.last_error(), libc::EBADF);
    }

    #[test]
    fn test_close_keeps_file() {
        let vfs = VolatileVfs::new();
        let fd = vfs.open(Some("a"), OpenFlags::create()).unwrap();
        vfs.close(fd).unwrap();
        assert!(vfs.access("a"));
        assert!(vfs.file_by_fd(fd).is_err());
    }

    #[test]
    fn test_delete_busy_until_all_closed() {
        let vfs = VolatileVfs::new();
        let a = vfs.open(Some("a"), OpenFlags::create()).unwrap();
        let b = vfs.open(Some("a"), OpenFlags::existing()).unwrap();

        assert!(matches!(vfs.delete("a"), Err(VfsError::Busy(_))));
        assert_eq!(vfs.last_error(), libc::EBUSY);

        vfs.close(a).unwrap();
        assert!(matches!(vfs.delete("a"), Err(VfsError::Busy(_))));

        vfs.close(b).unwrap();
        vfs.delete("a").unwrap();
        assert!(!vfs.access("a"));
    }

    #[test]
    fn test_delete_missing() {
        let vfs = VolatileVfs::new();
        assert!(matches!(vfs.delete("nope"), Err(VfsError::NotFound(_))));
        assert_eq!(vfs.last_error(), libc::ENOENT);
    }

    #[test]
    fn test_file_by_name_missing_records_ebadf() {
        let vfs = VolatileVfs::new();
        assert!(matches!(vfs.file_by_name("ghost"), Err(VfsError::NotFound(_))));
        assert_eq!(vfs.last_error(), libc::EBADF);
    }

    #[test]
    fn test_access_records_enoent() {
        let vfs = VolatileVfs::new();
        assert_eq!(vfs.last_error(), 0);
        assert!(!vfs.access("ghost"));
        assert_eq!(vfs.last_error(), libc::ENOENT);
    }

    #[test]
    fn test_anonymous_delete_on_close() {
        let vfs = VolatileVfs::new();
        let flags = OpenFlags {
            create: true,
            delete_on_close: true,
            ..Default::default()
        };
        let fd = vfs.open(None, flags).unwrap();
        assert_eq!(vfs.file_names().len(), 1);

        vfs.close(fd).unwrap();
        assert!(vfs.file_names().is_empty());
    }

    #[test]
    fn test_anonymous_names_are_unique() {
        let vfs = VolatileVfs::new();
        vfs.open(None, OpenFlags::create()).unwrap();
        vfs.open(None, OpenFlags::create()).unwrap();
        let names = vfs.file_names();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_create_with_contents() {
        let vfs = VolatileVfs::new();
        vfs.create_with_contents("a", b"abc".to_vec()).unwrap();
        assert_eq!(vfs.file_by_name("a").unwrap().size(), 3);
        assert!(matches!(
            vfs.create_with_contents("a", Vec::new()),
            Err(VfsError::AlreadyExists(_))
        ));
    }
}
