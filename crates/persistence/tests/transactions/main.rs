//! Transaction tests for persistence backends.
//!
//! This module contains tests for the transaction handle lifecycle,
//! the one-live-handle guard and rollback scenarios.

#![cfg(feature = "sqlite")]

#[path = "../common/mod.rs"]
mod common;

mod basic_tests;
mod rollback_tests;
