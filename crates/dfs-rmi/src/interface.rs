//! Remote interface abstraction, decoupling stubs and skeletons from the
//! interfaces they carry.
//!
//! Every remote interface is described by a marker type implementing
//! [`Interface`]: an identity string and a static table of method
//! descriptors. Stubs use the table to build envelopes; skeletons use it to
//! resolve incoming calls by exact (name, parameter descriptors) match.
//!
//! A skeleton additionally needs [`Dispatch`], which turns a resolved method
//! and its encoded arguments into a call on the server object.

use std::future::Future;

use async_trait::async_trait;
use dfs_proto::{CallEnvelope, CallOutcome, MethodDescriptor, RmiError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Identity and method table of a remote interface.
pub trait Interface: Send + Sync + 'static {
    /// Interface identity; two stubs are equal only if these match.
    const NAME: &'static str;

    /// Every method callable through this interface.
    const METHODS: &'static [MethodDescriptor];

    /// Resolve a call by exact name and parameter descriptor match.
    fn resolve(name: &str, params: &[String]) -> Option<&'static MethodDescriptor> {
        Self::METHODS.iter().find(|m| m.matches(name, params))
    }

    /// Look up a method by name alone.
    fn method(name: &str) -> Option<&'static MethodDescriptor> {
        Self::METHODS.iter().find(|m| m.name == name)
    }

    /// The RPC-layer error for a call this interface does not declare.
    fn no_such_method(name: &str, params: &[String]) -> RmiError {
        RmiError::NoSuchMethod {
            interface: Self::NAME.to_owned(),
            method: name.to_owned(),
            params: params.join(", "),
        }
    }
}

/// Server-side half of an interface: invoke a resolved method on `S`.
#[async_trait]
pub trait Dispatch<S: ?Sized + Send + Sync>: Interface {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome;
}

/// Decode the argument tuple, run `call`, and encode what it returns.
///
/// Dispatch adapters build each method arm from this: a decode failure is
/// an RPC-layer failure, `Err` from the implementation is an exception.
pub async fn invoke<A, R, E, F, Fut>(envelope: &CallEnvelope, call: F) -> CallOutcome
where
    A: DeserializeOwned,
    R: Serialize,
    E: Serialize,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let args: A = match envelope.decode_args() {
        Ok(args) => args,
        Err(e) => return CallOutcome::Failure(e),
    };
    match call(args).await {
        Ok(value) => CallOutcome::value(&value),
        Err(error) => CallOutcome::exception(&error),
    }
}

/// Fallback arm for dispatch adapters.
pub fn unknown_method<I: Interface>(method: &MethodDescriptor) -> CallOutcome {
    let params: Vec<String> = method.params.iter().map(|p| (*p).to_owned()).collect();
    CallOutcome::Failure(I::no_such_method(method.name, &params))
}
