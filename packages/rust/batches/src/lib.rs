//! Batch transport for docenrich.
//!
//! This crate provides:
//! - [`BatchStore`] / [`BatchClient`]: pull and push batches over the collection service API
//! - [`DocumentStream`]: line-at-a-time decoding of gzip NDJSON payloads
//! - [`BatchWriter`]: NDJSON + gzip encoding of enriched documents

pub mod client;
pub mod codec;

pub use client::{BatchClient, BatchStore};
pub use codec::{BatchWriter, DocumentStream, StreamItem, fallback_payload};
