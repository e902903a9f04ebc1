//! QuantSys Core — orchestrator, stages, and domain types for a systematic
//! trading pipeline.
//!
//! This crate contains the heart of the system:
//! - Domain types (dated series, instrument metadata, name newtypes)
//! - The pull-based orchestrator with its memoization cache
//! - Layered configuration (explicit value → estimation → built-in default)
//! - The six standard pipeline stages, with fixed/estimated variant pairs
//! - Trading rule traits and the EWMAC rule family
//! - Data providers (CSV directory, in-memory, seeded synthetic)
//! - Performance statistics over P&L curves

pub mod config;
pub mod data;
pub mod domain;
pub mod estimate;
pub mod rules;
pub mod stages;
pub mod stats;
pub mod system;
