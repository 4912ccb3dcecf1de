//! Core domain types
//!
//! This module contains the core domain structures used across Forge crates.
//! These types represent the fundamental business entities shared between
//! the coordinator client (for network exchange) and the runner (for execution).

pub mod job;
pub mod runner;
pub mod version;
