//! Interfaces exposed by a storage server.
//!
//! - [`Storage`]: file data access, used by clients and by other storage
//!   servers during replication.
//! - [`Command`]: administrative operations issued by the naming server.

use async_trait::async_trait;
use dfs_proto::{CallEnvelope, CallOutcome, FsResult, MethodDescriptor, Path};
use dfs_rmi::{invoke, unknown_method, Dispatch, Interface, Stub};

pub type StorageStub = Stub<StorageRemote>;
pub type CommandStub = Stub<CommandRemote>;

/// Data access to the files hosted by one storage server.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Length of `file` in bytes.
    ///
    /// `NotFound` if the file does not exist or is a directory.
    async fn size(&self, file: Path) -> FsResult<u64>;

    /// Read `length` bytes at `offset`.
    ///
    /// `IndexOutOfRange` if the range extends past the end of the file.
    async fn read(&self, file: Path, offset: u64, length: u32) -> FsResult<Vec<u8>>;

    /// Write `data` at `offset`, growing the file as needed.
    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> FsResult<()>;
}

/// Commands the naming server sends to a storage server.
#[async_trait]
pub trait Command: Send + Sync {
    /// Create an empty file, with any missing parent directories.
    /// Returns `false` if the file exists or `file` is the root.
    async fn create(&self, file: Path) -> FsResult<bool>;

    /// Delete a file or a directory tree. Returns `false` if nothing was
    /// deleted.
    async fn delete(&self, path: Path) -> FsResult<bool>;

    /// Replace the local copy of `file` with the one held by `source`.
    async fn copy(&self, file: Path, source: StorageStub) -> FsResult<bool>;
}

pub enum StorageRemote {}

impl Interface for StorageRemote {
    const NAME: &'static str = "Storage";
    const METHODS: &'static [MethodDescriptor] = &[
        MethodDescriptor::new("size", &["Path"], "u64"),
        MethodDescriptor::new("read", &["Path", "u64", "u32"], "Vec<u8>"),
        MethodDescriptor::new("write", &["Path", "u64", "Vec<u8>"], "()"),
    ];
}

#[async_trait]
impl<S: Storage + ?Sized> Dispatch<S> for StorageRemote {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome {
        match method.name {
            "size" => invoke(envelope, |(file,): (Path,)| server.size(file)).await,
            "read" => {
                invoke(envelope, |(file, offset, length): (Path, u64, u32)| {
                    server.read(file, offset, length)
                })
                .await
            }
            "write" => {
                invoke(envelope, |(file, offset, data): (Path, u64, Vec<u8>)| {
                    server.write(file, offset, data)
                })
                .await
            }
            _ => unknown_method::<Self>(method),
        }
    }
}

#[async_trait]
impl Storage for StorageStub {
    async fn size(&self, file: Path) -> FsResult<u64> {
        self.call("size", (file,)).await
    }

    async fn read(&self, file: Path, offset: u64, length: u32) -> FsResult<Vec<u8>> {
        self.call("read", (file, offset, length)).await
    }

    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> FsResult<()> {
        self.call("write", (file, offset, data)).await
    }
}

pub enum CommandRemote {}

impl Interface for CommandRemote {
    const NAME: &'static str = "Command";
    const METHODS: &'static [MethodDescriptor] = &[
        MethodDescriptor::new("create", &["Path"], "bool"),
        MethodDescriptor::new("delete", &["Path"], "bool"),
        MethodDescriptor::new("copy", &["Path", "Stub<Storage>"], "bool"),
    ];
}

#[async_trait]
impl<S: Command + ?Sized> Dispatch<S> for CommandRemote {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome {
        match method.name {
            "create" => invoke(envelope, |(file,): (Path,)| server.create(file)).await,
            "delete" => invoke(envelope, |(path,): (Path,)| server.delete(path)).await,
            "copy" => {
                invoke(envelope, |(file, source): (Path, StorageStub)| {
                    server.copy(file, source)
                })
                .await
            }
            _ => unknown_method::<Self>(method),
        }
    }
}

#[async_trait]
impl Command for CommandStub {
    async fn create(&self, file: Path) -> FsResult<bool> {
        self.call("create", (file,)).await
    }

    async fn delete(&self, path: Path) -> FsResult<bool> {
        self.call("delete", (path,)).await
    }

    async fn copy(&self, file: Path, source: StorageStub) -> FsResult<bool> {
        self.call("copy", (file, source)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dashmap::DashMap;
    use dfs_proto::FsError;
    use dfs_rmi::{RemoteAddr, Skeleton};

    /// Storage server that keeps files in memory.
    #[derive(Default)]
    struct MemoryStore {
        files: DashMap<Path, Vec<u8>>,
    }

    #[async_trait]
    impl Storage for MemoryStore {
        async fn size(&self, file: Path) -> FsResult<u64> {
            self.files
                .get(&file)
                .map(|data| data.len() as u64)
                .ok_or_else(|| FsError::not_found(&file))
        }

        async fn read(&self, file: Path, offset: u64, length: u32) -> FsResult<Vec<u8>> {
            let data = self.files.get(&file).ok_or_else(|| FsError::not_found(&file))?;
            let start = offset as usize;
            let end = start + length as usize;
            if end > data.len() {
                return Err(FsError::IndexOutOfRange(format!("{start}..{end}")));
            }
            Ok(data[start..end].to_vec())
        }

        async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> FsResult<()> {
            let mut entry = self.files.get_mut(&file).ok_or_else(|| FsError::not_found(&file))?;
            let start = offset as usize;
            if entry.len() < start + data.len() {
                entry.resize(start + data.len(), 0);
            }
            entry[start..start + data.len()].copy_from_slice(&data);
            Ok(())
        }
    }

    #[async_trait]
    impl Command for MemoryStore {
        async fn create(&self, file: Path) -> FsResult<bool> {
            if file.is_root() || self.files.contains_key(&file) {
                return Ok(false);
            }
            self.files.insert(file, Vec::new());
            Ok(true)
        }

        async fn delete(&self, path: Path) -> FsResult<bool> {
            Ok(self.files.remove(&path).is_some())
        }

        async fn copy(&self, file: Path, source: StorageStub) -> FsResult<bool> {
            let size = source.size(file.clone()).await?;
            let data = source.read(file.clone(), 0, size as u32).await?;
            self.files.insert(file, data);
            Ok(true)
        }
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    async fn serve(
        store: Arc<MemoryStore>,
    ) -> (
        Skeleton<StorageRemote, MemoryStore>,
        Skeleton<CommandRemote, MemoryStore>,
    ) {
        let any = "127.0.0.1:0".parse().unwrap();
        let storage = Skeleton::new(store.clone(), any);
        let command = Skeleton::new(store, any);
        storage.start().await.unwrap();
        command.start().await.unwrap();
        (storage, command)
    }

    #[test]
    fn test_method_names_are_unique() {
        for methods in [StorageRemote::METHODS, CommandRemote::METHODS] {
            for (i, a) in methods.iter().enumerate() {
                assert!(methods[i + 1..].iter().all(|b| b.name != a.name));
            }
        }
    }

    #[tokio::test]
    async fn test_storage_calls_through_stubs() {
        let store = Arc::new(MemoryStore::default());
        let (storage, command) = serve(store.clone()).await;
        let storage_stub = Stub::for_skeleton(&storage).unwrap();
        let command_stub = Stub::for_skeleton(&command).unwrap();

        assert!(command_stub.create(p("/a/b")).await.unwrap());
        assert!(!command_stub.create(p("/a/b")).await.unwrap());

        storage_stub.write(p("/a/b"), 0, b"hello".to_vec()).await.unwrap();
        assert_eq!(storage_stub.size(p("/a/b")).await.unwrap(), 5);
        assert_eq!(storage_stub.read(p("/a/b"), 1, 3).await.unwrap(), b"ell");

        let err = storage_stub.read(p("/a/b"), 3, 10).await.unwrap_err();
        assert!(matches!(err, FsError::IndexOutOfRange(_)));
        let err = storage_stub.size(p("/nope")).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));

        storage.stop().await;
        command.stop().await;
    }

    #[tokio::test]
    async fn test_copy_passes_a_stub_as_argument() {
        let source = Arc::new(MemoryStore::default());
        let target = Arc::new(MemoryStore::default());
        source.files.insert(p("/data"), b"replicated bytes".to_vec());

        let (source_storage, source_command) = serve(source).await;
        let (target_storage, target_command) = serve(target.clone()).await;

        let source_stub: StorageStub = Stub::for_skeleton(&source_storage).unwrap();
        let target_command_stub: CommandStub = Stub::for_skeleton(&target_command).unwrap();

        assert!(target_command_stub.copy(p("/data"), source_stub).await.unwrap());
        assert_eq!(
            target.files.get(&p("/data")).map(|d| d.value().clone()),
            Some(b"replicated bytes".to_vec())
        );

        for skeleton in [&source_storage, &target_storage] {
            skeleton.stop().await;
        }
        for skeleton in [&source_command, &target_command] {
            skeleton.stop().await;
        }
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_rmi_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let stub: StorageStub = Stub::new(RemoteAddr::new("127.0.0.1", port));
        assert!(matches!(stub.size(p("/a")).await, Err(FsError::Rmi(_))));
    }
}
