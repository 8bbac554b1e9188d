//! Coordinator side: batches what pages report, forwards it to native hosts,
//! and keeps pages in sync with their tabs.

mod coordinator;
mod host;
pub mod native_messaging;
mod port;
mod tabs;

pub use coordinator::RelayCoordinator;
pub use host::{HostEndpoint, NativeHost, StdoutHost};
pub use port::{PagePort, PageRequest, PortMessage};
pub use tabs::{TabInventory, TabRegistry};
