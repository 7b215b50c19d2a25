//! A single-file, memory-mapped, cache-oblivious lookahead array (COLA) index
//! over unique 64-bit keys.
//!
//! The index is a sequence of doubling-capacity levels on disk (level `l`
//! holds `2^l` elements); inserting a key merges it down through every
//! currently-full level below the first free one, the way a binary counter
//! carries. Queries binary-search each occupied level. See [`Database`] for
//! the public entry point.

pub mod db;
pub mod engine;
pub mod error;
pub mod fileio;
pub mod format;
pub mod heap;
pub mod layout;
pub mod mapping;
pub mod stream;

pub use db::Database;
pub use error::{Error, Result};
