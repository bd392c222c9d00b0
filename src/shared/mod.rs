//! Shared Data Model & Wire Types
//!
//! Everything both sides of the wire need to agree on: the metadata records
//! owned by the coordinator, the DTOs exchanged over HTTP, checksum helpers,
//! the retry combinator, and the error kinds surfaced by the core.
//!
//! ## Submodules
//! - **`types`**: Typed metadata records (files, chunks, replicas, workers,
//!   sessions, leases) and their state enums.
//! - **`protocol`**: API endpoint constants and request/response DTOs for the
//!   coordinator and worker HTTP surfaces.
//! - **`checksum`**: SHA-256 helpers (one-shot and incremental).
//! - **`retry`**: The retry combinator used by every outbound HTTP caller.
//! - **`error`**: `DfsError` and its single mapping to HTTP status codes.

pub mod checksum;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod types;

#[cfg(test)]
mod tests;
