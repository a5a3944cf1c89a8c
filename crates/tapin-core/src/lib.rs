//! Core types and trait definitions for the tapin attendance ledger.
//!
//! Everything in this crate is independent of HTTP and storage. The pure
//! derivations (session reconstruction, rollups) live here so they can be
//! tested without a database; backends and the API layer depend on this
//! crate, never the other way around.

pub mod error;
pub mod event;
pub mod rollup;
pub mod roster;
pub mod session;
pub mod store;
pub mod token;
pub mod tz;

pub use error::{Error, Result};
