//! Server-side dispatcher for a remote interface.
//!
//! Lifecycle: `Created → Listening → Stopped`.
//!
//!   start → bind → spawn(accept_loop) → spawn(serve_connection) per client
//!
//! Each connection carries exactly one call. The worker reads the envelope,
//! resolves the method, invokes it on the shared server object, writes the
//! outcome and closes. Workers share nothing but the server object, whose
//! own synchronization is the implementation's business.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use dfs_proto::{CallEnvelope, CallOutcome, MethodDescriptor, RmiError};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::frame::{read_frame, write_frame};
use crate::interface::Dispatch;
use crate::net::create_listen_socket;

/// Lifecycle state of a skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkeletonState {
    Created,
    Listening,
    Stopped,
}

/// Notification points of a skeleton.
///
/// The defaults log and treat every accept error as fatal.
pub trait SkeletonHooks: Send + Sync + 'static {
    /// Called when accepting a connection fails while listening.
    ///
    /// Return `true` to keep listening; `false` stops the skeleton with the
    /// error as its cause.
    fn listen_error(&self, error: &std::io::Error) -> bool {
        error!("accept error: {}", error);
        false
    }

    /// Called when a worker fails outside the call protocol, e.g. the
    /// connection breaks before an envelope or outcome is exchanged.
    fn service_error(&self, error: &RmiError) {
        warn!("connection worker failed: {}", error);
    }

    /// Called exactly once when the accept loop has exited. `cause` is
    /// `None` after a requested stop.
    fn stopped(&self, cause: Option<&RmiError>) {
        match cause {
            Some(cause) => error!("skeleton stopped: {}", cause),
            None => debug!("skeleton stopped"),
        }
    }
}

/// Hooks that only log.
pub struct LogHooks;

impl SkeletonHooks for LogHooks {}

struct Lifecycle {
    state: SkeletonState,
    local_addr: Option<SocketAddr>,
    cause: Option<RmiError>,
}

/// Listener that serves interface `I` from the server object `S`.
pub struct Skeleton<I, S: ?Sized> {
    server: Arc<S>,
    bind_addr: SocketAddr,
    hooks: Arc<dyn SkeletonHooks>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    shutdown: Arc<Notify>,
    /// Accept loop handle; the async mutex also serializes start/stop.
    accept_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    _interface: PhantomData<fn() -> I>,
}

impl<I, S> Skeleton<I, S>
where
    I: Dispatch<S>,
    S: ?Sized + Send + Sync + 'static,
{
    /// Create a skeleton that will listen on `bind_addr` (port 0 lets the
    /// system choose). Nothing is bound until [`start`](Self::start).
    pub fn new(server: Arc<S>, bind_addr: SocketAddr) -> Self {
        Self {
            server,
            bind_addr,
            hooks: Arc::new(LogHooks),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: SkeletonState::Created,
                local_addr: None,
                cause: None,
            })),
            shutdown: Arc::new(Notify::new()),
            accept_task: tokio::sync::Mutex::new(None),
            _interface: PhantomData,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SkeletonHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn server(&self) -> &Arc<S> {
        &self.server
    }

    pub fn state(&self) -> SkeletonState {
        self.lifecycle.lock().state
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().local_addr
    }

    /// Error that stopped the skeleton, if it did not stop on request.
    pub fn cause(&self) -> Option<RmiError> {
        self.lifecycle.lock().cause.clone()
    }

    /// Bind the listening socket and spawn the accept loop.
    pub async fn start(&self) -> Result<(), RmiError> {
        let mut task = self.accept_task.lock().await;
        if self.state() != SkeletonState::Created {
            return Err(RmiError::AlreadyStarted);
        }

        let listener = create_listen_socket(self.bind_addr).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RmiError::Network(e.to_string()))?;

        {
            let mut lc = self.lifecycle.lock();
            lc.state = SkeletonState::Listening;
            lc.local_addr = Some(local_addr);
            lc.cause = None;
        }
        info!("{} listening on {}", I::NAME, local_addr);

        *task = Some(tokio::spawn(accept_loop::<I, S>(
            listener,
            self.server.clone(),
            self.hooks.clone(),
            self.lifecycle.clone(),
            self.shutdown.clone(),
        )));
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Idempotent. Calls already handed to workers run to completion.
    pub async fn stop(&self) {
        let mut task = self.accept_task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        if self.state() == SkeletonState::Listening {
            // notify_one stores a permit if the loop is not parked right now.
            self.shutdown.notify_one();
        }
        if let Err(e) = handle.await {
            error!("{} accept loop ended abnormally: {}", I::NAME, e);
        }
    }
}

impl<I, S: ?Sized> Drop for Skeleton<I, S> {
    fn drop(&mut self) {
        if self.lifecycle.lock().state == SkeletonState::Listening {
            self.shutdown.notify_one();
        }
    }
}

/// Accept loop: spawn a worker per connection until stopped or a fatal
/// accept error.
async fn accept_loop<I, S>(
    listener: TcpListener,
    server: Arc<S>,
    hooks: Arc<dyn SkeletonHooks>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    shutdown: Arc<Notify>,
) where
    I: Dispatch<S>,
    S: ?Sized + Send + Sync + 'static,
{
    let cause = loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let server = server.clone();
                        let hooks = hooks.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection::<I, S>(server, stream).await {
                                debug!("{} worker for {} failed: {}", I::NAME, peer, e);
                                hooks.service_error(&e);
                            }
                        });
                    }
                    Err(e) => {
                        if hooks.listen_error(&e) {
                            continue;
                        }
                        break Some(RmiError::Network(e.to_string()));
                    }
                }
            }
            _ = shutdown.notified() => {
                info!("{} accept loop shutting down", I::NAME);
                break None;
            }
        }
    };

    drop(listener);
    {
        let mut lc = lifecycle.lock();
        lc.state = SkeletonState::Stopped;
        lc.cause = cause.clone();
    }
    hooks.stopped(cause.as_ref());
}

/// Handle one connection: read one envelope, dispatch, write one outcome.
async fn serve_connection<I, S>(server: Arc<S>, mut stream: TcpStream) -> Result<(), RmiError>
where
    I: Dispatch<S>,
    S: ?Sized + Send + Sync + 'static,
{
    stream.set_nodelay(true).ok();

    let envelope: CallEnvelope = read_frame(&mut stream).await?;

    let outcome = match I::resolve(&envelope.method, &envelope.param_types) {
        Some(method) => invoke_isolated::<I, S>(server, method, envelope).await,
        None => {
            debug!(
                "{}: no method {}({})",
                I::NAME,
                envelope.method,
                envelope.param_types.join(", ")
            );
            CallOutcome::Failure(I::no_such_method(&envelope.method, &envelope.param_types))
        }
    };

    write_frame(&mut stream, &outcome).await?;
    stream.shutdown().await.ok();
    Ok(())
}

/// Run the dispatch in its own task so a panicking implementation becomes
/// an RPC-layer failure instead of a dead connection.
async fn invoke_isolated<I, S>(
    server: Arc<S>,
    method: &'static MethodDescriptor,
    envelope: CallEnvelope,
) -> CallOutcome
where
    I: Dispatch<S>,
    S: ?Sized + Send + Sync + 'static,
{
    let task = tokio::spawn(async move { I::dispatch(&*server, method, &envelope).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            warn!("{}::{} panicked", I::NAME, method.name);
            CallOutcome::Failure(RmiError::Remote(format!(
                "{}::{} panicked",
                I::NAME,
                method.name
            )))
        }
        Err(e) => CallOutcome::Failure(RmiError::Remote(e.to_string())),
    }
}
