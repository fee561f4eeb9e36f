//! # kiln Core
//!
//! Domain types, traits, and error definitions for the kiln prompt engine.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping tier and provider implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod provider;
pub mod record;
pub mod tier;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LoadError, ProviderError, Result, StoreError, TierError};
pub use provider::{Generation, OutputFormat, Provider};
pub use record::PromptRecord;
pub use tier::{CacheTier, DurableTier};
