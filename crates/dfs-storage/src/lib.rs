//! # dfs-storage
//!
//! The storage server keeps file data in a directory of the local file
//! system. It serves the `Storage` interface to clients and the `Command`
//! interface to the naming server, and registers its files with the naming
//! server on start-up.

pub mod node;
pub mod server;

pub use node::StorageNode;
pub use server::StorageServer;
