//! Catalog persistence
//!
//! [`Catalog`] owns the pool and the in-process write lock; `models` holds
//! the queries, written against a bare connection so they compose inside a
//! caller's transaction.

pub mod catalog;
pub mod models;

pub use catalog::Catalog;
