//! Volatile VFS error types.

use std::io;
use std::os::raw::c_int;
use thiserror::Error;

/// Volatile VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No file with this name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Exclusive create of a name that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Delete of a file that still has open descriptors.
    #[error("file is busy: {0}")]
    Busy(String),

    /// Unknown open-file descriptor.
    #[error("bad descriptor: {0}")]
    BadDescriptor(u64),

    /// Allocation failure (file growth or shared-memory region).
    #[error("out of memory")]
    OutOfMemory,

    /// Lock mode outside none/shared/reserved/pending/exclusive.
    #[error("unknown lock mode: {0}")]
    UnknownLockMode(c_int),

    /// Dump refused a name that would escape the target directory.
    #[error("can't dump absolute file path {0}")]
    AbsolutePath(String),

    /// Dump refused a name with `..` components.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Dump of a single file failed.
    #[error("failed to dump file {name}: {source}")]
    Dump {
        name: String,
        #[source]
        source: Box<VfsError>,
    },

    /// The engine refused to register the VFS.
    #[error("engine rejected registration: status {0}")]
    Registration(c_int),

    /// Rejected registration options.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Create a Busy error.
    pub fn busy(name: impl Into<String>) -> Self {
        Self::Busy(name.into())
    }

    /// Create an AbsolutePath error.
    pub fn absolute_path(name: impl Into<String>) -> Self {
        Self::AbsolutePath(name.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(name: impl Into<String>) -> Self {
        Self::PathEscapesRoot(name.into())
    }

    /// Wrap an error raised while dumping `name`.
    pub fn dump(name: impl Into<String>, source: VfsError) -> Self {
        Self::Dump {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// POSIX error number recorded as the namespace's last error.
    pub fn errno(&self) -> c_int {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::AlreadyExists(_) => libc::EEXIST,
            VfsError::Busy(_) => libc::EBUSY,
            VfsError::BadDescriptor(_) => libc::EBADF,
            VfsError::OutOfMemory => libc::ENOMEM,
            VfsError::UnknownLockMode(_) => libc::EINVAL,
            VfsError::AbsolutePath(_) | VfsError::InvalidConfig(_) => libc::EINVAL,
            VfsError::PathEscapesRoot(_) => libc::EPERM,
            VfsError::Dump { source, .. } => source.errno(),
            VfsError::Registration(_) => libc::EIO,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::Busy(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            VfsError::BadDescriptor(fd) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad descriptor: {fd}"))
            }
            VfsError::OutOfMemory => io::Error::new(io::ErrorKind::OutOfMemory, "out of memory"),
            VfsError::UnknownLockMode(mode) => io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown lock mode: {mode}"),
            ),
            VfsError::AbsolutePath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::PathEscapesRoot(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::InvalidConfig(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            e @ (VfsError::Dump { .. } | VfsError::Registration(_)) => {
                io::Error::other(e.to_string())
            }
            VfsError::Io(e) => e,
        }
    }
}

/// Volatile VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VfsError::not_found("a").errno(), libc::ENOENT);
        assert_eq!(VfsError::already_exists("a").errno(), libc::EEXIST);
        assert_eq!(VfsError::busy("a").errno(), libc::EBUSY);
        assert_eq!(VfsError::BadDescriptor(7).errno(), libc::EBADF);
        assert_eq!(VfsError::OutOfMemory.errno(), libc::ENOMEM);
    }

    #[test]
    fn test_dump_wraps_source() {
        let err = VfsError::dump("db", VfsError::absolute_path("/etc/passwd"));
        assert_eq!(err.errno(), libc::EINVAL);
        assert!(err.to_string().contains("failed to dump file db"));
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn test_into_io_error() {
        let io: io::Error = VfsError::not_found("x").into();
        assert_eq!(io.kind(), io::ErrorKind::NotFound);

        let io: io::Error = VfsError::busy("x").into();
        assert_eq!(io.kind(), io::ErrorKind::ResourceBusy);
    }
}
