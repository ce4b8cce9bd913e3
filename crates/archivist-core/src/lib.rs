//! Core types for the archivist reconciliation engine.
//!
//! Owns the configuration record, the key normalizer, drift classification
//! between persisted and configured key definitions, and the
//! [`store::RecordStore`] trait that storage backends implement. Nothing in
//! here touches a database.

// The store trait spells out `impl Future + Send` returns; backends
// implement it with plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod drift;
pub mod error;
pub mod normalize;
pub mod record;
pub mod report;
pub mod store;

pub use error::{Error, Result};
