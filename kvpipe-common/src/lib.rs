// kvpipe-common - Shared configuration and error types for kvpipe
//
// This crate defines the host/pool configuration model and the error taxonomy
// shared by the client, the mock store and the bench binary.

pub mod config;
pub mod error;

// Re-export for convenience
pub use config::*;
pub use error::*;
