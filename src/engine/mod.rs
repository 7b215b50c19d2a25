//! The three operations the index supports beyond open/create/close: the
//! k-way-merge insertion engine, the per-level binary-search query engine,
//! and the level dump.

pub mod dump;
pub mod insert;
pub mod query;
