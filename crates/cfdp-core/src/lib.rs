//! cfdp-core: CFDP wire format reader and entity configuration.
//! All other crates in the workspace depend on this one.

pub mod config;
pub mod wire;

pub use config::CfdpConfig;
pub use wire::{AckedDirective, FileDirective, PduHeader, PduType, TransactionId, WireError};
