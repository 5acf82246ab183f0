//! Expensa statement service client.
//!
//! Uploads bank statements to the external statement-processing service and
//! exposes its event stream to the import queue through
//! [`expensa_core::imports::StatementProcessorTrait`].

pub mod client;
pub mod config;

pub use client::StatementServiceClient;
pub use config::StatementServiceConfig;
