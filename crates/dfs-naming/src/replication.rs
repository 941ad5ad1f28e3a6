//! Read-driven file replication.
//!
//! After every shared lock of a file the naming server asks a
//! [`ReplicationPolicy`] whether the file deserves another replica. If so,
//! a background task picks a registered storage server that does not host
//! the file and tells it to copy the file from the primary host. The new
//! host is recorded only after the copy succeeds.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use dfs_api::{Command, CommandStub, StorageStub};
use dfs_proto::{FsError, FsResult, Path};
use tracing::{debug, info, warn};

/// What the policy sees of a file at the moment it is read-locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSample {
    /// Shared locks granted on the file so far, this one included.
    pub reads: u64,
    /// Storage servers currently hosting the file.
    pub replicas: usize,
    /// Storage servers registered with the naming server.
    pub storages: usize,
}

pub trait ReplicationPolicy: Send + Sync + 'static {
    fn should_replicate(&self, sample: ReadSample) -> bool;
}

/// Never replicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReplication;

impl ReplicationPolicy for NoReplication {
    fn should_replicate(&self, _sample: ReadSample) -> bool {
        false
    }
}

/// Add a replica on every `every`-th read, up to `max_replicas` hosts.
#[derive(Debug, Clone, Copy)]
pub struct ReadThreshold {
    pub every: u64,
    pub max_replicas: usize,
}

impl ReplicationPolicy for ReadThreshold {
    fn should_replicate(&self, sample: ReadSample) -> bool {
        self.every > 0
            && sample.reads > 0
            && sample.reads % self.every == 0
            && sample.replicas < self.max_replicas
            && sample.replicas < sample.storages
    }
}

/// File hosts, primary first.
pub(crate) type HostMap = DashMap<Path, Vec<StorageStub>>;
pub(crate) type StorageMap = DashMap<StorageStub, CommandStub>;

#[derive(Clone)]
pub(crate) struct Replicator {
    policy: Arc<dyn ReplicationPolicy>,
    files: Arc<HostMap>,
    storages: Arc<StorageMap>,
    in_flight: Arc<DashSet<Path>>,
}

impl Replicator {
    pub(crate) fn new(
        policy: Arc<dyn ReplicationPolicy>,
        files: Arc<HostMap>,
        storages: Arc<StorageMap>,
    ) -> Self {
        Self {
            policy,
            files,
            storages,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Consult the policy after `file` was read-locked for the `reads`-th
    /// time; spawn a replication if it says so and none is running for
    /// this file.
    pub(crate) fn on_shared_lock(&self, file: &Path, reads: u64) {
        let Some(replicas) = self.files.get(file).map(|hosts| hosts.len()) else {
            return;
        };
        let sample = ReadSample {
            reads,
            replicas,
            storages: self.storages.len(),
        };
        if !self.policy.should_replicate(sample) {
            return;
        }
        if !self.in_flight.insert(file.clone()) {
            debug!("replication of {} already in flight", file);
            return;
        }

        let this = self.clone();
        let file = file.clone();
        tokio::spawn(async move {
            match this.replicate(&file).await {
                Ok(Some(target)) => info!("replicated {} to {}", file, target.address()),
                Ok(None) => debug!("no storage available to replicate {}", file),
                Err(e) => warn!("replication of {} failed: {}", file, e),
            }
            this.in_flight.remove(&file);
        });
    }

    /// Copy `file` from its primary host to one storage server that does
    /// not host it yet. Returns the new host, or `None` if every registered
    /// storage already hosts the file.
    pub(crate) async fn replicate(&self, file: &Path) -> FsResult<Option<StorageStub>> {
        let hosts = self
            .files
            .get(file)
            .map(|hosts| hosts.value().clone())
            .ok_or_else(|| FsError::not_found(file))?;
        let primary = hosts
            .first()
            .cloned()
            .ok_or_else(|| FsError::illegal_state(format!("{file} has no hosts")))?;

        let target = self
            .storages
            .iter()
            .find(|entry| !hosts.contains(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()));
        let Some((storage, command)) = target else {
            return Ok(None);
        };

        debug!("copying {} from {} to {}", file, primary.address(), storage.address());
        if !command.copy(file.clone(), primary).await? {
            return Err(FsError::illegal_state(format!(
                "{} refused to copy {}",
                storage.address(),
                file
            )));
        }

        match self.files.get_mut(file) {
            Some(mut hosts) => {
                if !hosts.contains(&storage) {
                    hosts.push(storage.clone());
                }
                Ok(Some(storage))
            }
            None => Err(FsError::not_found(file)),
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
