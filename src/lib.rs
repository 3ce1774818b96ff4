//! Bridges storage-change notifications delivered over a queue to
//! blob processing backed by object storage. Inbound notifications
//! are screened by an admission filter before any storage access
//! happens; admitted blobs are read, transformed, written back as
//! derived blobs, and announced on an event queue.

pub mod app;
pub mod client;
pub mod conf;
pub mod emit;
pub mod event;
pub mod filter;
