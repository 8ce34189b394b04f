//! Foundation types for the sequence cache.
//!
//! This crate provides the identities and key encoding shared by the storage
//! engine and the loader adapters. Every other seqcache crate depends on
//! `seqcache-types`.
//!
//! # Key Types
//!
//! - [`BlobId`] -- `(sat, sub_sat, sat_key)` identity of one logical blob
//! - [`ChunkId`] -- independently addressable piece of a blob (0 = main)
//! - [`SeqId`] -- sequence identifier object (gi, accession, local name)
//! - [`RecordKind`] -- closed set of identifier-keyed record kinds
//!
//! The [`keys`] module turns these into the canonical string keys and subkeys
//! under which the cache stores records.

pub mod blob_id;
pub mod error;
pub mod keys;
pub mod seq_id;

pub use blob_id::{BlobId, ChunkId};
pub use error::TypeError;
pub use keys::RecordKind;
pub use seq_id::SeqId;
