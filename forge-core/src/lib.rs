//! Forge Core
//!
//! Core types and abstractions for the Forge build-execution platform.
//!
//! This crate contains:
//! - Domain types: Core business entities (JobDescriptor, RunnerIdentity, etc.)
//! - DTOs: Data transfer objects exchanged with the coordinator

pub mod domain;
pub mod dto;
