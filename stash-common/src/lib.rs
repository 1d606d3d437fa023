//! # Stash Common Library
//!
//! Shared code for the stash services:
//! - Error type used by catalog and configuration code
//! - TOML configuration and root folder resolution
//! - Event bus carrying import progress notifications
//! - Catalog schema bootstrap

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
