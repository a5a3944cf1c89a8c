//! SQLite backend for the tapin attendance ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! worker thread without blocking the async runtime. The worker serialises
//! every operation; the race-prone ones (punch toggle, token consumption,
//! the bulk-logout sweep) additionally run inside an IMMEDIATE transaction
//! within a single closure, so they stay atomic even when another process
//! shares the database file.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
