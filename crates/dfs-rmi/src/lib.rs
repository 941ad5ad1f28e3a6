//! # dfs-rmi
//!
//! Remote method invocation over TCP: typed client stubs, listening
//! skeletons, and the one-call-per-connection wire protocol between them.
//!
//! An interface is made remotable by a marker type implementing
//! [`Interface`] (identity and method table) and, on the serving side,
//! [`Dispatch`]. The stub side is an ordinary trait impl on [`Stub`] that
//! forwards each method through [`Stub::call`].

pub mod frame;
pub mod interface;
pub mod net;
pub mod skeleton;
pub mod stub;

#[cfg(test)]
mod testing;

pub use interface::{invoke, unknown_method, Dispatch, Interface};
pub use net::RemoteAddr;
pub use skeleton::{LogHooks, Skeleton, SkeletonHooks, SkeletonState};
pub use stub::Stub;
