//! # dfs-api
//!
//! The four remote interfaces of the file system, each with its stub
//! forwarding impl and its skeleton dispatch adapter:
//!
//! | Interface      | Served by       | Called by                      |
//! |----------------|-----------------|--------------------------------|
//! | `Service`      | naming server   | clients                        |
//! | `Registration` | naming server   | storage servers at startup     |
//! | `Storage`      | storage server  | clients, other storage servers |
//! | `Command`      | storage server  | naming server                  |

pub mod naming;
pub mod storage;

pub use naming::{
    registration_stub, service_stub, Registration, RegistrationRemote, RegistrationStub, Service,
    ServiceRemote, ServiceStub,
};
pub use storage::{Command, CommandRemote, CommandStub, Storage, StorageRemote, StorageStub};
