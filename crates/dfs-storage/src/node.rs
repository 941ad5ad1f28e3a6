//! A running storage server and its start-up registration.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dfs_api::{Command, CommandRemote, CommandStub, Registration, StorageRemote, StorageStub};
use dfs_proto::{FsResult, Path};
use dfs_rmi::{Skeleton, Stub};
use tracing::{info, warn};

use crate::server::StorageServer;

pub struct StorageNode {
    server: Arc<StorageServer>,
    storage: Skeleton<StorageRemote, StorageServer>,
    command: Skeleton<CommandRemote, StorageServer>,
}

impl StorageNode {
    pub fn new(
        server: Arc<StorageServer>,
        client_addr: SocketAddr,
        command_addr: SocketAddr,
    ) -> Self {
        Self {
            storage: Skeleton::new(server.clone(), client_addr),
            command: Skeleton::new(server.clone(), command_addr),
            server,
        }
    }

    /// Node listening on the given ports of `ip`; port 0 lets the system
    /// choose.
    pub fn bind(
        server: Arc<StorageServer>,
        ip: IpAddr,
        client_port: u16,
        command_port: u16,
    ) -> Self {
        Self::new(
            server,
            SocketAddr::new(ip, client_port),
            SocketAddr::new(ip, command_port),
        )
    }

    pub fn server(&self) -> &Arc<StorageServer> {
        &self.server
    }

    /// Start serving and register with the naming server.
    ///
    /// The stubs handed to the naming server carry `hostname`, which must be
    /// reachable by clients and other storage servers. Local files the
    /// naming server already knows from elsewhere are deleted, then empty
    /// directories are pruned.
    pub async fn start<R>(&self, hostname: &str, naming: &R) -> FsResult<()>
    where
        R: Registration + ?Sized,
    {
        self.server.check_root().await?;
        self.command.start().await?;
        if let Err(e) = self.storage.start().await {
            self.command.stop().await;
            return Err(e.into());
        }

        if let Err(e) = self.register(hostname, naming).await {
            self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    async fn register<R>(&self, hostname: &str, naming: &R) -> FsResult<()>
    where
        R: Registration + ?Sized,
    {
        let (storage, command) = self.stubs(hostname)?;
        let files = self.server.list_files().await?;
        let offered = files.len();

        let duplicates: Vec<Path> = naming.register(storage, command, files).await?;
        for path in &duplicates {
            if !self.server.delete(path.clone()).await? {
                warn!("duplicate {} was already gone", path);
            }
        }
        let pruned = self.server.prune_empty_dirs().await?;

        info!(
            "registered {} as {}: offered {} files, deleted {} duplicates, pruned {} directories",
            self.server.root().display(),
            hostname,
            offered,
            duplicates.len(),
            pruned
        );
        Ok(())
    }

    /// Stubs for this node, addressed through `hostname`.
    pub fn stubs(&self, hostname: &str) -> FsResult<(StorageStub, CommandStub)> {
        Ok((
            Stub::for_skeleton_with_host(&self.storage, hostname)?,
            Stub::for_skeleton_with_host(&self.command, hostname)?,
        ))
    }

    pub async fn stop(&self) {
        self.storage.stop().await;
        self.command.stop().await;
        info!("storage server for {} stopped", self.server.root().display());
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.storage.local_addr()
    }

    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.command.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use dfs_api::{Service, ServiceStub, Storage};
    use dfs_naming::{NamingNode, NamingServer};
    use dfs_proto::FsError;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn naming() -> NamingNode {
        let node = NamingNode::bind(Arc::new(NamingServer::new()), LOCALHOST, 0, 0);
        node.start().await.unwrap();
        node
    }

    fn storage_node(root: &std::path::Path) -> StorageNode {
        StorageNode::bind(Arc::new(StorageServer::new(root)), LOCALHOST, 0, 0)
    }

    fn seed(root: &std::path::Path, files: &[&str]) {
        for file in files {
            let local = root.join(file.trim_start_matches('/'));
            std::fs::create_dir_all(local.parent().unwrap()).unwrap();
            std::fs::write(&local, file.as_bytes()).unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_registers_and_drops_duplicates() {
        let naming = naming().await;
        let registration: dfs_api::RegistrationStub =
            Stub::new(naming.registration_addr().unwrap());
        let service: ServiceStub = Stub::new(naming.service_addr().unwrap());

        let first_dir = tempfile::tempdir().unwrap();
        seed(first_dir.path(), &["/shared/a", "/only-first"]);
        let first = storage_node(first_dir.path());
        first.start("127.0.0.1", &registration).await.unwrap();

        let second_dir = tempfile::tempdir().unwrap();
        seed(second_dir.path(), &["/shared/a", "/dup/deep/only-dup", "/mine/b"]);
        std::fs::create_dir_all(second_dir.path().join("hollow/inner")).unwrap();
        // /only-first is a file on the first server, so nothing may live below it.
        seed(second_dir.path(), &["/only-first/below"]);
        let second = storage_node(second_dir.path());
        second.start("127.0.0.1", &registration).await.unwrap();

        // Duplicates were deleted and emptied directories pruned.
        assert!(!second_dir.path().join("shared").exists());
        assert!(!second_dir.path().join("only-first").exists());
        assert!(!second_dir.path().join("hollow").exists());
        assert!(second_dir.path().join("mine/b").exists());
        assert!(second_dir.path().join("dup/deep/only-dup").exists());
        assert!(first_dir.path().join("shared/a").exists());

        // The naming server routes each file to the server that kept it.
        let (first_storage, _) = first.stubs("127.0.0.1").unwrap();
        let (second_storage, _) = second.stubs("127.0.0.1").unwrap();
        assert_eq!(service.get_storage(p("/shared/a")).await.unwrap(), first_storage);
        assert_eq!(service.get_storage(p("/mine/b")).await.unwrap(), second_storage);

        let host = service.get_storage(p("/mine/b")).await.unwrap();
        assert_eq!(host.read(p("/mine/b"), 0, 6).await.unwrap(), b"/mine/b"[..6].to_vec());

        // Files created through the naming server land on the first storage.
        assert!(service.create_file(p("/mine/new")).await.unwrap());
        assert!(first_dir.path().join("mine/new").exists());

        first.stop().await;
        second.stop().await;
        naming.stop().await;
    }

    #[tokio::test]
    async fn test_start_requires_root_directory() {
        let naming = naming().await;
        let registration: dfs_api::RegistrationStub =
            Stub::new(naming.registration_addr().unwrap());

        let dir = tempfile::tempdir().unwrap();
        let node = storage_node(&dir.path().join("missing"));
        assert!(matches!(
            node.start("127.0.0.1", &registration).await,
            Err(FsError::NotFound(_))
        ));
        assert!(node.client_addr().is_none());

        naming.stop().await;
    }

    #[tokio::test]
    async fn test_failed_registration_stops_node() {
        let naming = naming().await;
        let registration: dfs_api::RegistrationStub =
            Stub::new(naming.registration_addr().unwrap());

        let dir = tempfile::tempdir().unwrap();
        let node = storage_node(dir.path());
        node.start("127.0.0.1", &registration).await.unwrap();
        let (storage, command) = node.stubs("127.0.0.1").unwrap();

        // Registering the same storage stub again is refused.
        let err = registration.register(storage, command, vec![]).await.unwrap_err();
        assert!(matches!(err, FsError::IllegalState(_)));

        node.stop().await;
        naming.stop().await;

        let other = storage_node(dir.path());
        let unreachable = other.start("127.0.0.1", &registration).await.unwrap_err();
        assert!(matches!(unreachable, FsError::Rmi(_)));
        assert_eq!(other.storage.state(), dfs_rmi::SkeletonState::Stopped);
    }
}
