//! Client-side proxy for a remote interface.
//!
//! A [`Stub`] is nothing but an address and an interface identity. Creating
//! one never touches the network; each forwarded call opens its own
//! connection, sends one envelope, waits for the outcome and closes.
//!
//! Formatting, hashing and equality are answered locally from the binding:
//! they have no meaningful remote counterpart.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use dfs_proto::{CallEnvelope, CallOutcome, RmiError};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::frame::{read_frame, write_frame};
use crate::interface::{Dispatch, Interface};
use crate::net::{connect_to, RemoteAddr};
use crate::skeleton::Skeleton;

/// Proxy for interface `I` at a remote address.
pub struct Stub<I> {
    addr: RemoteAddr,
    _interface: PhantomData<fn() -> I>,
}

impl<I: Interface> Stub<I> {
    /// Bind a stub to `addr`. No I/O happens until the first call.
    pub fn new(addr: impl Into<RemoteAddr>) -> Self {
        Self {
            addr: addr.into(),
            _interface: PhantomData,
        }
    }

    /// Stub for a running skeleton, using the address it is bound to.
    ///
    /// Fails if the skeleton is not listening, or if it listens on a
    /// wildcard address that callers could not use.
    pub fn for_skeleton<S>(skeleton: &Skeleton<I, S>) -> Result<Self, RmiError>
    where
        I: Dispatch<S>,
        S: ?Sized + Send + Sync + 'static,
    {
        let local = skeleton.local_addr().ok_or(RmiError::NotListening)?;
        if local.ip().is_unspecified() {
            return Err(RmiError::Unresolved(format!(
                "skeleton for {} is bound to wildcard address {}",
                I::NAME,
                local
            )));
        }
        Ok(Self::new(local))
    }

    /// Stub for a running skeleton, reached through an externally visible
    /// host name rather than the bound address.
    pub fn for_skeleton_with_host<S>(
        skeleton: &Skeleton<I, S>,
        host: &str,
    ) -> Result<Self, RmiError>
    where
        I: Dispatch<S>,
        S: ?Sized + Send + Sync + 'static,
    {
        let local = skeleton.local_addr().ok_or(RmiError::NotListening)?;
        Ok(Self::new(RemoteAddr::new(host, local.port())))
    }

    pub fn address(&self) -> &RemoteAddr {
        &self.addr
    }

    pub fn interface_name(&self) -> &'static str {
        I::NAME
    }

    /// Forward a call to the remote object.
    ///
    /// `args` is the method's argument tuple. Transport failures and
    /// undecodable replies come back as `E::from(RmiError)`; errors raised by
    /// the remote implementation come back as they were raised.
    pub async fn call<A, R, E>(&self, method: &str, args: A) -> Result<R, E>
    where
        A: Serialize,
        R: DeserializeOwned,
        E: DeserializeOwned + From<RmiError>,
    {
        let descriptor = I::method(method).ok_or_else(|| I::no_such_method(method, &[]))?;
        let envelope = CallEnvelope::new(descriptor, &args)?;
        debug!("calling {}::{} on {}", I::NAME, descriptor, self.addr);

        let outcome = self.round_trip(&envelope).await?;
        outcome.into_result()
    }

    async fn round_trip(&self, envelope: &CallEnvelope) -> Result<CallOutcome, RmiError> {
        let mut stream = connect_to(&self.addr).await?;
        write_frame(&mut stream, envelope).await?;
        read_frame(&mut stream).await
    }
}

impl<I> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr.clone(),
            _interface: PhantomData,
        }
    }
}

impl<I: Interface, J: Interface> PartialEq<Stub<J>> for Stub<I> {
    fn eq(&self, other: &Stub<J>) -> bool {
        I::NAME == J::NAME && self.addr == other.addr
    }
}

impl<I: Interface> Eq for Stub<I> {}

impl<I: Interface> Hash for Stub<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        I::NAME.hash(state);
        self.addr.hash(state);
    }
}

impl<I: Interface> fmt::Display for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote {} at {}", I::NAME, self.addr)
    }
}

impl<I: Interface> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stub<{}>({})", I::NAME, self.addr)
    }
}

/// On-the-wire form of a stub: the binding, nothing else.
#[derive(Serialize)]
struct StubRef<'a> {
    interface: &'a str,
    addr: &'a RemoteAddr,
}

#[derive(Deserialize)]
struct StubRepr {
    interface: String,
    addr: RemoteAddr,
}

impl<I: Interface> Serialize for Stub<I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StubRef {
            interface: I::NAME,
            addr: &self.addr,
        }
        .serialize(serializer)
    }
}

impl<'de, I: Interface> Deserialize<'de> for Stub<I> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = StubRepr::deserialize(deserializer)?;
        if repr.interface != I::NAME {
            return Err(D::Error::custom(format!(
                "expected a {} stub, got a {} stub",
                I::NAME,
                repr.interface
            )));
        }
        Ok(Self::new(repr.addr))
    }
}
