//! # dfs-naming
//!
//! The naming server owns the directory tree of the file system. It knows
//! which storage servers host each file, serializes client access through
//! hierarchical path locks, and replicates files that are read often.

pub mod lock;
pub mod node;
pub mod replication;
pub mod server;

pub use lock::{LockError, LockMode, LockStats, PathLock};
pub use node::NamingNode;
pub use replication::{NoReplication, ReadSample, ReadThreshold, ReplicationPolicy};
pub use server::NamingServer;
