//! # volatile-vfs
//!
//! In-memory SQLite VFS. Every file the engine opens (database, journal,
//! WAL) lives in a RAM buffer, and WAL shared memory is emulated with heap
//! regions, so a database needs no disk at all unless explicitly dumped.
//!
//! ```no_run
//! use rusqlite::{Connection, OpenFlags};
//!
//! let fs = volatile_vfs::register_volatile_file_system("volatile")?;
//! let conn = Connection::open_with_flags_and_vfs("app.db", OpenFlags::default(), "volatile")?;
//! conn.execute_batch("PRAGMA journal_mode=WAL; CREATE TABLE t (n INT);")?;
//! drop(conn);
//!
//! fs.dump("/tmp/snapshot")?;
//! fs.unregister();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Layers, leaves first:
//!
//! - [`VolatileFile`] - one file's bytes, lock counters and shm regions
//! - [`VolatileVfs`] - names and descriptors for one file system
//! - [`registry`] - process-wide table of registered file systems
//! - [`adapter`] - the `sqlite3_vfs` / `sqlite3_io_methods` callbacks
//!
//! Locking is intra-process only: lock calls update counters, and
//! shared-memory locks are no-ops.

pub mod adapter;
mod config;
mod dump;
mod error;
pub mod file;
pub mod namespace;
pub mod registry;
mod types;

pub use config::{DEFAULT_MAX_PATHNAME, VolatileConfig};
pub use error::{VfsError, VfsResult};
pub use file::VolatileFile;
pub use namespace::VolatileVfs;
pub use registry::{
    VolatileFileSystem, register_volatile_file_system, register_volatile_file_system_with,
    unregister_volatile_file_system,
};
pub use types::{Descriptor, InstanceId, LockMode, OpenFlags, ReadOutcome};
