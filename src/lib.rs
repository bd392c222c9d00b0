//! Distributed File System Library
//!
//! This library crate defines the core modules of the DFS: a chunked,
//! replicated object store with a single-master metadata coordinator, a
//! pool of storage workers, and a client that streams file bytes in
//! fixed-size chunks to several replicas in parallel.
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`coordinator`**: The metadata authority. Owns the namespace, the
//!   file -> chunk -> replica mapping, placement decisions, the upload
//!   session state machine, path leases, and the background loops that
//!   repair under-replicated chunks and collect deleted files.
//! - **`worker`**: The storage plane. Content-addressed chunk storage with
//!   checksum-on-write and checksum-on-read, heartbeat reporting, and
//!   fan-out of incoming writes to peer workers.
//! - **`client`**: The protocol driver. Three-phase uploads, parallel
//!   verified downloads with replica failover, and metadata operations.
//! - **`shared`**: The data model, wire DTOs, checksum helpers, the retry
//!   combinator and the error kinds everything else agrees on.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod shared;
pub mod worker;
