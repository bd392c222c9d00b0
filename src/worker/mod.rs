//! Storage Worker Module
//!
//! One worker owns the bytes on one disk and nothing else: it stores and
//! serves opaque blobs by chunk id, reports truthfully what it holds, and
//! fans incoming writes out to peers when asked.
//!
//! ## Core Mechanisms
//! - **Crash-safe writes**: body then sidecar, each temp-file-then-rename,
//!   so no partial write can ever be mistaken for a valid chunk.
//! - **Verify on read**: every GET recomputes the digest while streaming;
//!   a mismatch aborts the response and quarantines the copy, which the
//!   next heartbeat stops reporting.
//! - **Heartbeats**: the full inventory goes to the coordinator every
//!   interval; whatever this worker reports IS its set of placements.
//!
//! ## Submodules
//! - **`chunkstore`**: The on-disk store and its inventory cache.
//! - **`handlers`**: The chunk transfer HTTP surface.
//! - **`heartbeat`**: The emitter loop, disk stats and the hourly scrub.

pub mod chunkstore;
pub mod handlers;
pub mod heartbeat;
