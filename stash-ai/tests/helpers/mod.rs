//! Test Helper Utilities
//!
//! Shared utilities for testing stash-ai

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;

pub use fixtures::{
    memory_archive, memory_task, test_config, write_folder, BrokenArchive, RecordingSink, TestEnv,
    TestPlugin,
};
pub use log_capture::{init_test_logging, LogCapture};
