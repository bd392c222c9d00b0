//! Client Library Module
//!
//! The uploading/downloading side of the protocol: a `DfsClient` that
//! performs the three-phase upload, parallel verified downloads with
//! replica failover, and the metadata conveniences (list, stat, delete,
//! nodes, health). Transfers default to the coordinator proxy so callers
//! behind NAT never need to address workers directly.

pub mod client;

pub use client::{ClientConfig, DfsClient, TransferMode};

#[cfg(test)]
mod tests;
