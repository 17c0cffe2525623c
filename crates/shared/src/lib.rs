//! Shared types and utilities for Tradeyard services

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
