//! Naming server state and the Service/Registration implementations.
//!
//! The directory tree lives in two concurrent maps: `directories` maps each
//! directory to the names of its entries, `files` maps each file to the
//! storage servers hosting it (primary first). Every path in either map has
//! a [`PathLock`] in `locks`; the root always exists.
//!
//! Mutations of the tree (create, register) are serialized by `tree`, which
//! also owns the storage servers in registration order. Per-path locks are
//! a separate, client-visible mechanism and do not guard the maps.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dfs_api::{Command, CommandStub, Registration, Service, StorageStub};
use dfs_proto::{FsError, FsResult, Path};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::lock::{LockError, LockMode, LockStats, PathLock};
use crate::replication::{HostMap, NoReplication, ReplicationPolicy, Replicator, StorageMap};

pub struct NamingServer {
    directories: DashMap<Path, BTreeSet<String>>,
    files: Arc<HostMap>,
    storages: Arc<StorageMap>,
    locks: DashMap<Path, Arc<PathLock>>,
    /// Serializes tree mutation; storage servers in registration order.
    tree: Mutex<Vec<StorageStub>>,
    replicator: Replicator,
}

impl Default for NamingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingServer {
    /// Empty tree, no replication.
    pub fn new() -> Self {
        Self::with_policy(Arc::new(NoReplication))
    }

    pub fn with_policy(policy: Arc<dyn ReplicationPolicy>) -> Self {
        let files = Arc::new(HostMap::new());
        let storages = Arc::new(StorageMap::new());
        let directories = DashMap::new();
        directories.insert(Path::root(), BTreeSet::new());
        let locks = DashMap::new();
        locks.insert(Path::root(), Arc::new(PathLock::new()));

        Self {
            directories,
            replicator: Replicator::new(policy, files.clone(), storages.clone()),
            files,
            storages,
            locks,
            tree: Mutex::new(Vec::new()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.directories.contains_key(path) || self.files.contains_key(path)
    }

    fn lock_of(&self, path: &Path) -> Option<Arc<PathLock>> {
        self.locks.get(path).map(|lock| lock.value().clone())
    }

    /// Link `path` into the tree: record it in its parent's entries,
    /// creating missing ancestor directories, and give every path on the
    /// chain a lock.
    fn thread(&self, path: &Path) {
        let chain = path.sub_paths();
        for pair in chain.windows(2) {
            let (parent, child) = (&pair[0], &pair[1]);
            if let Ok(name) = child.last() {
                self.directories
                    .entry(parent.clone())
                    .or_default()
                    .insert(name.to_owned());
            }
            self.locks
                .entry(parent.clone())
                .or_insert_with(|| Arc::new(PathLock::new()));
        }
        self.locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(PathLock::new()));
    }

    /// A registered file collides with an existing path, or with a file
    /// standing where one of its ancestor directories would go.
    fn collides(&self, file: &Path) -> bool {
        if self.exists(file) {
            return true;
        }
        let chain = file.sub_paths();
        chain[..chain.len() - 1]
            .iter()
            .any(|ancestor| self.files.contains_key(ancestor))
    }

    /// Lock statistics of `path`, if it exists.
    pub fn lock_stats(&self, path: &Path) -> Option<LockStats> {
        self.lock_of(path).map(|lock| lock.stats())
    }

    /// Storage servers hosting `file`, primary first.
    pub fn hosts(&self, file: &Path) -> Vec<StorageStub> {
        self.files
            .get(file)
            .map(|hosts| hosts.value().clone())
            .unwrap_or_default()
    }

    /// Replicate `file` to one more storage server right away, bypassing
    /// the policy. Returns the new host, if any storage was available.
    pub async fn replicate_now(&self, file: &Path) -> FsResult<Option<StorageStub>> {
        self.replicator.replicate(file).await
    }

    /// Fail every pending and future lock wait. Used on shutdown.
    pub fn interrupt_locks(&self) {
        for lock in self.locks.iter() {
            lock.value().interrupt();
        }
        debug!("interrupted {} path locks", self.locks.len());
    }

    #[cfg(test)]
    pub(crate) fn replications_in_flight(&self) -> usize {
        self.replicator.in_flight()
    }
}

/// Locks acquired so far by one `lock` call. Released on drop, so a call
/// that fails or is cancelled partway leaves nothing behind.
#[derive(Default)]
struct HeldChain {
    locks: Vec<(Arc<PathLock>, LockMode)>,
}

impl HeldChain {
    /// Keep every lock held; returns the last one of the chain.
    fn keep(mut self) -> Option<Arc<PathLock>> {
        std::mem::take(&mut self.locks)
            .pop()
            .map(|(lock, _)| lock)
    }
}

impl Drop for HeldChain {
    fn drop(&mut self) {
        for (lock, mode) in self.locks.drain(..).rev() {
            if let Err(e) = lock.unlock(mode) {
                warn!("releasing partially acquired lock chain: {}", e);
            }
        }
    }
}

#[async_trait]
impl Service for NamingServer {
    async fn lock(&self, path: Path, exclusive: bool) -> FsResult<()> {
        if !self.locks.contains_key(&path) {
            return Err(FsError::not_found(&path));
        }

        let chain = path.sub_paths();
        let last = chain.len() - 1;
        let mut held = HeldChain::default();
        for (i, step) in chain.iter().enumerate() {
            let mode = if i == last {
                LockMode::from_exclusive(exclusive)
            } else {
                LockMode::Shared
            };
            let lock = self.lock_of(step).ok_or_else(|| FsError::not_found(step))?;
            lock.lock(mode).await?;
            held.locks.push((lock, mode));
        }
        let target = held.keep();
        debug!("locked {} ({})", path, LockMode::from_exclusive(exclusive));

        if !exclusive && self.files.contains_key(&path) {
            if let Some(lock) = target {
                self.replicator.on_shared_lock(&path, lock.stats().read_grants);
            }
        }
        Ok(())
    }

    async fn unlock(&self, path: Path, exclusive: bool) -> FsResult<()> {
        if !self.locks.contains_key(&path) {
            return Err(FsError::invalid(format!("{path} has no lock")));
        }

        let chain = path.sub_paths();
        let last = chain.len() - 1;
        let mut first_error: Option<LockError> = None;
        for (i, step) in chain.iter().enumerate().rev() {
            let mode = if i == last {
                LockMode::from_exclusive(exclusive)
            } else {
                LockMode::Shared
            };
            let result = match self.lock_of(step) {
                Some(lock) => lock.unlock(mode),
                None => Err(LockError::NotHeld(mode)),
            };
            if let Err(e) = result {
                warn!("unlock {}: {} at {}", path, e, step);
                first_error.get_or_insert(e);
            }
        }
        debug!("unlocked {} ({})", path, LockMode::from_exclusive(exclusive));

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn is_directory(&self, path: Path) -> FsResult<bool> {
        if self.directories.contains_key(&path) {
            Ok(true)
        } else if self.files.contains_key(&path) {
            Ok(false)
        } else {
            Err(FsError::not_found(&path))
        }
    }

    async fn list(&self, directory: Path) -> FsResult<Vec<String>> {
        match self.directories.get(&directory) {
            Some(entries) => Ok(entries.iter().cloned().collect()),
            None if self.files.contains_key(&directory) => Err(FsError::not_found(format!(
                "{directory} is not a directory"
            ))),
            None => Err(FsError::not_found(&directory)),
        }
    }

    async fn create_file(&self, file: Path) -> FsResult<bool> {
        if file.is_root() {
            return Ok(false);
        }
        let parent = file.parent()?;

        let (storage, command) = {
            let storages = self.tree.lock().await;
            if !self.directories.contains_key(&parent) {
                return Err(FsError::not_found(&parent));
            }
            if self.exists(&file) {
                return Ok(false);
            }
            storages
                .first()
                .and_then(|storage| {
                    self.storages
                        .get(storage)
                        .map(|command| (storage.clone(), command.value().clone()))
                })
                .ok_or_else(|| FsError::illegal_state("no storage server is registered"))?
        };

        // The tree is not held across the remote call.
        if !command.create(file.clone()).await? {
            debug!("{} refused to create {}", storage.address(), file);
            return Ok(false);
        }

        let tree = self.tree.lock().await;
        if self.exists(&file) {
            drop(tree);
            warn!("{} appeared while {} created it", file, storage.address());
            if let Err(e) = command.delete(file.clone()).await {
                warn!("removing stray {} from {}: {}", file, storage.address(), e);
            }
            return Ok(false);
        }
        self.files.insert(file.clone(), vec![storage]);
        self.thread(&file);
        drop(tree);
        info!("created file {}", file);
        Ok(true)
    }

    async fn create_directory(&self, directory: Path) -> FsResult<bool> {
        if directory.is_root() {
            return Ok(false);
        }
        let parent = directory.parent()?;

        let _tree = self.tree.lock().await;
        if !self.directories.contains_key(&parent) {
            return Err(FsError::not_found(&parent));
        }
        if self.exists(&directory) {
            return Ok(false);
        }
        self.directories.insert(directory.clone(), BTreeSet::new());
        self.thread(&directory);
        info!("created directory {}", directory);
        Ok(true)
    }

    async fn delete(&self, path: Path) -> FsResult<bool> {
        Err(FsError::NotImplemented(format!("delete {path}")))
    }

    async fn get_storage(&self, file: Path) -> FsResult<StorageStub> {
        self.files
            .get(&file)
            .and_then(|hosts| hosts.first().cloned())
            .ok_or_else(|| FsError::not_found(&file))
    }
}

#[async_trait]
impl Registration for NamingServer {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> FsResult<Vec<Path>> {
        let mut storages = self.tree.lock().await;
        if self.storages.contains_key(&storage) {
            return Err(FsError::illegal_state(format!(
                "{} is already registered",
                storage.address()
            )));
        }
        self.storages.insert(storage.clone(), command);
        storages.push(storage.clone());

        let offered = files.len();
        let mut duplicates = Vec::new();
        for file in files {
            if file.is_root() {
                continue;
            }
            if self.collides(&file) {
                duplicates.push(file);
                continue;
            }
            self.files.insert(file.clone(), vec![storage.clone()]);
            self.thread(&file);
        }

        info!(
            "registered storage {} with {} files, {} duplicates",
            storage.address(),
            offered,
            duplicates.len()
        );
        Ok(duplicates)
    }
}
