//! Interfaces exposed by the naming server.
//!
//! - [`Service`]: the client interface, served on [`SERVICE_PORT`].
//! - [`Registration`]: the storage-server interface, served on
//!   [`REGISTRATION_PORT`].

use async_trait::async_trait;
use dfs_proto::constants::{REGISTRATION_PORT, SERVICE_PORT};
use dfs_proto::{CallEnvelope, CallOutcome, FsResult, MethodDescriptor, Path};
use dfs_rmi::{invoke, unknown_method, Dispatch, Interface, RemoteAddr, Stub};

use crate::storage::{CommandStub, StorageStub};

pub type ServiceStub = Stub<ServiceRemote>;
pub type RegistrationStub = Stub<RegistrationRemote>;

/// Client-facing naming server operations.
#[async_trait]
pub trait Service: Send + Sync {
    /// Lock `path` for shared or exclusive access.
    ///
    /// Every proper ancestor is locked for shared access first, root first.
    /// Blocks until the whole chain is held. `NotFound` if `path` does not
    /// exist.
    async fn lock(&self, path: Path, exclusive: bool) -> FsResult<()>;

    /// Release a lock taken by [`lock`](Self::lock) with the same mode.
    async fn unlock(&self, path: Path, exclusive: bool) -> FsResult<()>;

    async fn is_directory(&self, path: Path) -> FsResult<bool>;

    /// Names of the entries of `directory`.
    async fn list(&self, directory: Path) -> FsResult<Vec<String>>;

    /// Create an empty file on one of the storage servers. Returns `false`
    /// if the path already exists.
    async fn create_file(&self, file: Path) -> FsResult<bool>;

    /// Returns `false` if the path already exists.
    async fn create_directory(&self, directory: Path) -> FsResult<bool>;

    async fn delete(&self, path: Path) -> FsResult<bool>;

    /// Storage server hosting `file`.
    async fn get_storage(&self, file: Path) -> FsResult<StorageStub>;
}

/// Storage-server registration.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Announce a storage server and the files it already holds.
    ///
    /// Returns the offered paths the naming server already knows about;
    /// the storage server should delete its local copies of those.
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> FsResult<Vec<Path>>;
}

pub enum ServiceRemote {}

impl Interface for ServiceRemote {
    const NAME: &'static str = "Service";
    const METHODS: &'static [MethodDescriptor] = &[
        MethodDescriptor::new("lock", &["Path", "bool"], "()"),
        MethodDescriptor::new("unlock", &["Path", "bool"], "()"),
        MethodDescriptor::new("is_directory", &["Path"], "bool"),
        MethodDescriptor::new("list", &["Path"], "Vec<String>"),
        MethodDescriptor::new("create_file", &["Path"], "bool"),
        MethodDescriptor::new("create_directory", &["Path"], "bool"),
        MethodDescriptor::new("delete", &["Path"], "bool"),
        MethodDescriptor::new("get_storage", &["Path"], "Stub<Storage>"),
    ];
}

#[async_trait]
impl<S: Service + ?Sized> Dispatch<S> for ServiceRemote {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome {
        match method.name {
            "lock" => {
                invoke(envelope, |(path, exclusive): (Path, bool)| {
                    server.lock(path, exclusive)
                })
                .await
            }
            "unlock" => {
                invoke(envelope, |(path, exclusive): (Path, bool)| {
                    server.unlock(path, exclusive)
                })
                .await
            }
            "is_directory" => invoke(envelope, |(path,): (Path,)| server.is_directory(path)).await,
            "list" => invoke(envelope, |(dir,): (Path,)| server.list(dir)).await,
            "create_file" => invoke(envelope, |(file,): (Path,)| server.create_file(file)).await,
            "create_directory" => {
                invoke(envelope, |(dir,): (Path,)| server.create_directory(dir)).await
            }
            "delete" => invoke(envelope, |(path,): (Path,)| server.delete(path)).await,
            "get_storage" => invoke(envelope, |(file,): (Path,)| server.get_storage(file)).await,
            _ => unknown_method::<Self>(method),
        }
    }
}

#[async_trait]
impl Service for ServiceStub {
    async fn lock(&self, path: Path, exclusive: bool) -> FsResult<()> {
        self.call("lock", (path, exclusive)).await
    }

    async fn unlock(&self, path: Path, exclusive: bool) -> FsResult<()> {
        self.call("unlock", (path, exclusive)).await
    }

    async fn is_directory(&self, path: Path) -> FsResult<bool> {
        self.call("is_directory", (path,)).await
    }

    async fn list(&self, directory: Path) -> FsResult<Vec<String>> {
        self.call("list", (directory,)).await
    }

    async fn create_file(&self, file: Path) -> FsResult<bool> {
        self.call("create_file", (file,)).await
    }

    async fn create_directory(&self, directory: Path) -> FsResult<bool> {
        self.call("create_directory", (directory,)).await
    }

    async fn delete(&self, path: Path) -> FsResult<bool> {
        self.call("delete", (path,)).await
    }

    async fn get_storage(&self, file: Path) -> FsResult<StorageStub> {
        self.call("get_storage", (file,)).await
    }
}

pub enum RegistrationRemote {}

impl Interface for RegistrationRemote {
    const NAME: &'static str = "Registration";
    const METHODS: &'static [MethodDescriptor] = &[MethodDescriptor::new(
        "register",
        &["Stub<Storage>", "Stub<Command>", "Vec<Path>"],
        "Vec<Path>",
    )];
}

#[async_trait]
impl<S: Registration + ?Sized> Dispatch<S> for RegistrationRemote {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome {
        match method.name {
            "register" => {
                invoke(
                    envelope,
                    |(storage, command, files): (StorageStub, CommandStub, Vec<Path>)| {
                        server.register(storage, command, files)
                    },
                )
                .await
            }
            _ => unknown_method::<Self>(method),
        }
    }
}

#[async_trait]
impl Registration for RegistrationStub {
    async fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> FsResult<Vec<Path>> {
        self.call("register", (storage, command, files)).await
    }
}

/// Stub for the service interface of the naming server on `host`.
pub fn service_stub(host: &str) -> ServiceStub {
    Stub::new(RemoteAddr::new(host, SERVICE_PORT))
}

/// Stub for the registration interface of the naming server on `host`.
pub fn registration_stub(host: &str) -> RegistrationStub {
    Stub::new(RemoteAddr::new(host, REGISTRATION_PORT))
}
