//! # dfs-proto
//!
//! Protocol types shared by every component of the distributed file
//! system: paths, the error taxonomy, and the call envelope exchanged by
//! stubs and skeletons.

pub mod call;
pub mod constants;
pub mod error;
pub mod path;

// Re-export commonly used types at the crate root
pub use call::{CallEnvelope, CallOutcome, MethodDescriptor};
pub use error::{FsError, FsResult, RmiError};
pub use path::Path;
