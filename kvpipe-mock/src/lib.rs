//! # kvpipe Mock Store
//!
//! An in-process, RESP2-speaking key-value server for tests and local demos.
//!
//! ```text
//! MockServer (sync handle)
//!   └── thread: tokio runtime
//!         └── accept loop ── handle_connection (per socket)
//!                               └── dispatch_command ── MemoryStore
//! ```

mod server;
mod store;

pub use server::MockServer;
pub use store::{MemoryStore, TtlStatus};
