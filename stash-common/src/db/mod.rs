//! Catalog schema and settings storage

pub mod init;

pub use init::*;
