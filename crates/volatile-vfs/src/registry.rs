//! Process-wide table of registered volatile file systems.
//!
//! The engine only hands the adapter a small integer (stored in the
//! registered VFS's app data), so every entry point resolves its namespace
//! through this table. The table has its own lock, separate from each
//! namespace's lock, so unrelated file systems never contend on it beyond
//! the lookup.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::adapter::Registration;
use crate::config::VolatileConfig;
use crate::dump;
use crate::error::{VfsError, VfsResult};
use crate::namespace::VolatileVfs;
use crate::types::InstanceId;

/// A registered namespace plus the options it was registered with.
#[derive(Debug)]
pub(crate) struct Instance {
    pub(crate) vfs: Arc<VolatileVfs>,
    pub(crate) config: VolatileConfig,
}

#[derive(Debug, Default)]
struct InstanceTable {
    instances: HashMap<InstanceId, (String, Arc<Instance>)>,
    next: u32,
}

static INSTANCES: LazyLock<RwLock<InstanceTable>> =
    LazyLock::new(|| RwLock::new(InstanceTable::default()));

/// Resolve a registered instance.
pub(crate) fn lookup(id: InstanceId) -> Option<Arc<Instance>> {
    INSTANCES
        .read()
        .instances
        .get(&id)
        .map(|(_, instance)| Arc::clone(instance))
}

/// Register a new volatile file system under `name` with default options.
///
/// # Panics
///
/// Panics if the instance id space is exhausted.
pub fn register_volatile_file_system(name: &str) -> VfsResult<VolatileFileSystem> {
    register_volatile_file_system_with(name, &VolatileConfig::default())
}

/// Register a new volatile file system under `name`.
///
/// Fails if `name` is already registered by this process or the engine
/// rejects the registration.
///
/// # Panics
///
/// Panics if the instance id space is exhausted.
pub fn register_volatile_file_system_with(
    name: &str,
    config: &VolatileConfig,
) -> VfsResult<VolatileFileSystem> {
    config.validate()?;

    let mut table = INSTANCES.write();
    if table.instances.values().any(|(existing, _)| existing == name) {
        return Err(VfsError::already_exists(name));
    }

    let id = InstanceId(table.next);
    let Some(next) = table.next.checked_add(1) else {
        panic!("volatile file system ids exhausted");
    };
    table.next = next;

    let vfs = Arc::new(VolatileVfs::new());
    let registration = Registration::register(name, id, config)?;
    table.instances.insert(
        id,
        (
            name.to_string(),
            Arc::new(Instance {
                vfs: Arc::clone(&vfs),
                config: config.clone(),
            }),
        ),
    );
    tracing::debug!(%id, name, "registered volatile file system");

    Ok(VolatileFileSystem {
        id,
        name: name.to_string(),
        vfs,
        registration: Some(registration),
    })
}

/// Unregister `fs` from the engine and drop all of its files.
///
/// # Panics
///
/// Panics if `fs` is not currently registered.
pub fn unregister_volatile_file_system(fs: VolatileFileSystem) {
    fs.unregister();
}

/// Handle to a registered volatile file system.
///
/// Dropping the handle unregisters the file system. Connections using it
/// must be closed first.
#[derive(Debug)]
pub struct VolatileFileSystem {
    id: InstanceId,
    name: String,
    vfs: Arc<VolatileVfs>,
    registration: Option<Registration>,
}

impl VolatileFileSystem {
    /// Name the file system was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id handed to the engine.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The underlying namespace, for descriptor-level access.
    pub fn namespace(&self) -> &VolatileVfs {
        &self.vfs
    }

    /// Copy of the content of `name`.
    pub fn read_file(&self, name: &str) -> VfsResult<Vec<u8>> {
        Ok(self.vfs.file_by_name(name)?.contents())
    }

    /// Add a file holding `data`. Fails if `name` already exists.
    pub fn create_file(&self, name: &str, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        self.vfs.create_with_contents(name, data.into())
    }

    /// Size of `name` in bytes.
    pub fn file_size(&self, name: &str) -> VfsResult<u64> {
        Ok(self.vfs.file_by_name(name)?.size())
    }

    /// Remove `name`. Fails while the engine has it open.
    pub fn remove(&self, name: &str) -> VfsResult<()> {
        self.vfs.delete(name)
    }

    /// Sorted names of all files.
    pub fn file_names(&self) -> Vec<String> {
        self.vfs.file_names()
    }

    /// Last POSIX error recorded by a failing namespace call.
    pub fn last_error(&self) -> i32 {
        self.vfs.last_error()
    }

    /// Write every file to `dir/<name>` on the real filesystem.
    pub fn dump(&self, dir: impl AsRef<Path>) -> VfsResult<()> {
        dump::dump(&self.vfs, dir.as_ref())
    }

    /// Unregister from the engine and drop all files.
    ///
    /// # Panics
    ///
    /// Panics if this file system is no longer in the instance table.
    pub fn unregister(mut self) {
        if !self.release() {
            panic!("unknown volatile file system {}", self.name);
        }
    }

    /// Remove from the instance table and the engine. Returns false if the
    /// instance was not registered.
    fn release(&mut self) -> bool {
        let Some(registration) = self.registration.take() else {
            return false;
        };

        let mut table = INSTANCES.write();
        if table.instances.remove(&self.id).is_none() {
            return false;
        }

        let open = self.vfs.open_count();
        if open > 0 {
            tracing::warn!(
                id = %self.id,
                name = %self.name,
                open,
                "unregistering volatile file system with open files; keeping engine struct alive"
            );
            registration.leak();
        } else {
            registration.unregister();
        }
        tracing::debug!(id = %self.id, name = %self.name, "unregistered volatile file system");
        true
    }
}

impl Drop for VolatileFileSystem {
    fn drop(&mut self) {
        if self.registration.is_some() {
            self.release();
        }
    }
}
