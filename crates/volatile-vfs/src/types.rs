//! Core volatile VFS types.

use rusqlite::ffi;
use std::fmt;
use std::os::raw::c_int;

use crate::error::{VfsError, VfsResult};

/// Handle for one open of a volatile file.
///
/// Allocated from a per-namespace serial counter, never reused while the
/// namespace lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(pub u64);

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

/// Identifier of a registered volatile file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vfs{}", self.0)
    }
}

/// Engine lock levels, each backed by its own counter on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

impl LockMode {
    /// All modes, in engine order.
    pub const ALL: [LockMode; 5] = [
        LockMode::None,
        LockMode::Shared,
        LockMode::Reserved,
        LockMode::Pending,
        LockMode::Exclusive,
    ];

    /// Index into the per-file counter vector.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<c_int> for LockMode {
    type Error = VfsError;

    fn try_from(value: c_int) -> VfsResult<Self> {
        match value {
            ffi::SQLITE_LOCK_NONE => Ok(LockMode::None),
            ffi::SQLITE_LOCK_SHARED => Ok(LockMode::Shared),
            ffi::SQLITE_LOCK_RESERVED => Ok(LockMode::Reserved),
            ffi::SQLITE_LOCK_PENDING => Ok(LockMode::Pending),
            ffi::SQLITE_LOCK_EXCLUSIVE => Ok(LockMode::Exclusive),
            other => Err(VfsError::UnknownLockMode(other)),
        }
    }
}

/// Flags relevant to opening a volatile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Create if not exists.
    pub create: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
    /// Remove the file once its last descriptor closes.
    pub delete_on_close: bool,
}

impl OpenFlags {
    /// Open an existing file.
    pub fn existing() -> Self {
        Self::default()
    }

    /// Open, creating if needed.
    pub fn create() -> Self {
        Self {
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Decode the engine's `SQLITE_OPEN_*` bit set.
    pub fn from_sqlite(flags: c_int) -> Self {
        Self {
            create: flags & ffi::SQLITE_OPEN_CREATE != 0,
            exclusive: flags & ffi::SQLITE_OPEN_EXCLUSIVE != 0,
            delete_on_close: flags & ffi::SQLITE_OPEN_DELETEONCLOSE != 0,
        }
    }
}

/// Result of reading a range from a volatile file.
///
/// The caller's buffer is always fully written; bytes past end of file are
/// zero.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole range was backed by file data.
    Complete,
    /// Only the first `n` bytes came from the file.
    Short(usize),
}

impl ReadOutcome {
    pub fn is_short(&self) -> bool {
        matches!(self, ReadOutcome::Short(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mode_from_engine() {
        assert_eq!(LockMode::try_from(ffi::SQLITE_LOCK_NONE).unwrap(), LockMode::None);
        assert_eq!(
            LockMode::try_from(ffi::SQLITE_LOCK_EXCLUSIVE).unwrap(),
            LockMode::Exclusive
        );
        assert!(matches!(
            LockMode::try_from(42),
            Err(VfsError::UnknownLockMode(42))
        ));
    }

    #[test]
    fn test_lock_mode_indices_are_distinct() {
        let mut seen: Vec<usize> = LockMode::ALL.iter().map(|m| m.index()).collect();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_open_flags_from_engine() {
        let flags = OpenFlags::from_sqlite(
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_EXCLUSIVE,
        );
        assert_eq!(flags, OpenFlags::create_exclusive());

        let flags = OpenFlags::from_sqlite(ffi::SQLITE_OPEN_READONLY);
        assert_eq!(flags, OpenFlags::existing());

        let flags = OpenFlags::from_sqlite(
            ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_DELETEONCLOSE,
        );
        assert!(flags.create);
        assert!(flags.delete_on_close);
    }
}
