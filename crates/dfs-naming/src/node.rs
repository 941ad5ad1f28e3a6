//! A running naming server: one [`NamingServer`] behind the Service and
//! Registration skeletons.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dfs_api::{RegistrationRemote, ServiceRemote};
use dfs_proto::RmiError;
use dfs_rmi::Skeleton;
use tracing::info;

use crate::server::NamingServer;

pub struct NamingNode {
    server: Arc<NamingServer>,
    service: Skeleton<ServiceRemote, NamingServer>,
    registration: Skeleton<RegistrationRemote, NamingServer>,
}

impl NamingNode {
    pub fn new(
        server: Arc<NamingServer>,
        service_addr: SocketAddr,
        registration_addr: SocketAddr,
    ) -> Self {
        Self {
            service: Skeleton::new(server.clone(), service_addr),
            registration: Skeleton::new(server.clone(), registration_addr),
            server,
        }
    }

    /// Node listening on the given ports of `ip`.
    pub fn bind(
        server: Arc<NamingServer>,
        ip: IpAddr,
        service_port: u16,
        registration_port: u16,
    ) -> Self {
        Self::new(
            server,
            SocketAddr::new(ip, service_port),
            SocketAddr::new(ip, registration_port),
        )
    }

    pub fn server(&self) -> &Arc<NamingServer> {
        &self.server
    }

    /// Start both skeletons. If the second fails to start, the first is
    /// stopped again.
    pub async fn start(&self) -> Result<(), RmiError> {
        self.registration.start().await?;
        if let Err(e) = self.service.start().await {
            self.registration.stop().await;
            return Err(e);
        }
        info!(
            "naming server up: service {:?}, registration {:?}",
            self.service.local_addr(),
            self.registration.local_addr()
        );
        Ok(())
    }

    /// Stop both skeletons, then fail every lock wait still pending.
    pub async fn stop(&self) {
        self.service.stop().await;
        self.registration.stop().await;
        self.server.interrupt_locks();
        info!("naming server stopped");
    }

    pub fn service_addr(&self) -> Option<SocketAddr> {
        self.service.local_addr()
    }

    pub fn registration_addr(&self) -> Option<SocketAddr> {
        self.registration.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use dfs_api::{Registration, RegistrationStub, Service, ServiceStub};
    use dfs_proto::{FsError, Path};
    use dfs_rmi::{RemoteAddr, Stub};

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    async fn started() -> NamingNode {
        let node = NamingNode::bind(
            Arc::new(NamingServer::new()),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
            0,
        );
        node.start().await.unwrap();
        node
    }

    fn stubs(node: &NamingNode) -> (ServiceStub, RegistrationStub) {
        (
            Stub::new(node.service_addr().unwrap()),
            Stub::new(node.registration_addr().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_remote_service_and_registration() {
        let node = started().await;
        let (service, registration) = stubs(&node);

        let storage = Stub::new(RemoteAddr::new("127.0.0.1", 7000));
        let command = Stub::new(RemoteAddr::new("127.0.0.1", 7001));
        let duplicates = registration
            .register(storage, command, vec![p("/x/y")])
            .await
            .unwrap();
        assert!(duplicates.is_empty());

        assert!(service.is_directory(p("/x")).await.unwrap());
        assert_eq!(service.list(p("/x")).await.unwrap(), vec!["y".to_string()]);
        assert!(service.create_directory(p("/x/z")).await.unwrap());

        // Application errors cross the wire unchanged.
        assert!(matches!(
            service.list(p("/nowhere")).await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(p("/x")).await,
            Err(FsError::NotImplemented(_))
        ));

        service.lock(p("/x/y"), false).await.unwrap();
        service.unlock(p("/x/y"), false).await.unwrap();

        node.stop().await;
    }

    #[tokio::test]
    async fn test_remote_create_file_without_storage() {
        let node = started().await;
        let (service, _) = stubs(&node);

        assert!(matches!(
            service.create_file(p("/a")).await,
            Err(FsError::IllegalState(_))
        ));
        assert!(matches!(
            service.is_directory(p("/a")).await,
            Err(FsError::NotFound(_))
        ));

        node.stop().await;
    }

    #[tokio::test]
    async fn test_stop_interrupts_lock_waits() {
        let node = started().await;
        let (service, _) = stubs(&node);
        service.create_directory(p("/d")).await.unwrap();
        service.lock(p("/d"), true).await.unwrap();

        let waiter = {
            let service = service.clone();
            tokio::spawn(async move { service.lock(p("/d"), true).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        node.stop().await;
        assert!(matches!(waiter.await.unwrap(), Err(FsError::IllegalState(_))));
        assert!(node.service_addr().is_some());
        assert!(matches!(
            service.is_directory(p("/d")).await,
            Err(FsError::Rmi(RmiError::Connect { .. }))
        ));
    }

    #[tokio::test]
    async fn test_start_rolls_back_on_bind_failure() {
        let first = started().await;
        let taken = first.service_addr().unwrap();

        let second = NamingNode::new(
            Arc::new(NamingServer::new()),
            taken,
            "127.0.0.1:0".parse().unwrap(),
        );
        assert!(matches!(second.start().await, Err(RmiError::Bind { .. })));
        assert!(second.registration_addr().is_some());
        assert_eq!(
            second.registration.state(),
            dfs_rmi::SkeletonState::Stopped
        );

        first.stop().await;
    }
}
