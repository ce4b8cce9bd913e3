//! SQLite backend for the archivist reconciliation engine.
//!
//! The reconciliation logic is written as synchronous functions over a
//! [`rusqlite::Connection`] so a whole run can share one transaction.
//! [`SqliteStore`] wraps [`tokio_rusqlite`] so all database access runs on a
//! dedicated thread without blocking the async runtime.

mod encode;
mod ident;

pub mod archive;
pub mod engine;
pub mod error;
pub mod index;
pub mod merge;
pub mod reclaim;
pub mod schema;
pub mod store;
pub mod upsert;

pub use error::{Error, Result};
pub use ident::{Ident, TableShape};
pub use store::SqliteStore;
