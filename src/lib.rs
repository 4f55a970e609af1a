//! # DLMM Position SDK
//!
//! Position synchronization and liquidity-distribution engine for segmented-bin
//! ("DLMM") liquidity pools.
//!
//! ## Overview
//!
//! The SDK keeps a persistent cache of each wallet's positions in sync with the
//! chain and builds phased transaction batches that deposit liquidity across
//! fixed-width position windows. It focuses on:
//!
//! - **Reconciliation**: cache-first wallet sync with per-pool retry, pacing, and
//!   per-position reserve attribution
//! - **Distribution**: spot, curve, and bid-ask allocation of a deposit over a bin range
//! - **Batching**: account preparation, position creation, and add-liquidity phases
//!   submitted strictly in order on an explicit blockhash epoch
//!
//! ## Architecture
//!
//! ### Pure Layer
//! Fixed-point share decoding, the bin price model, distributions, and bin-array
//! geometry. No I/O.
//!
//! ### Collaborator Seams
//! [`chain::DlmmChain`], [`store::PositionStore`], and [`signer::Signer`] are
//! injected at construction so every component can run against test doubles.
//!
//! ### Workflows
//! [`reconciler::Reconciler`] for wallet syncs and
//! [`batch::BatchPlanner`] + [`submitter::BatchSubmitter`] for deposits, both
//! fronted by [`engine::PositionEngine`].

// Core Types
/// Common types and data structures
pub mod types;
/// Error taxonomy
pub mod error;

// Pure Layer
/// Q64.64 liquidity-share decoding
pub mod fixed_point;
/// Bin price model
pub mod bin_price;
/// Liquidity distribution strategies
pub mod distribution;
/// Bin-array and position-window geometry
pub mod bin_array;

// Infrastructure
/// Retry with exponential backoff
pub mod retry;
/// Pacing between upstream calls
pub mod rate_limiter;
/// Chain client trait
pub mod chain;
/// Signing seam and transaction layout
pub mod signer;
/// PostgreSQL database integration
pub mod database;
/// Position store trait and Postgres implementation
pub mod store;
/// Metrics and observability
pub mod metrics;

// Workflows
/// Wallet position synchronization
pub mod reconciler;
/// Phased transaction batch planning
pub mod batch;
/// Batch submission and confirmation
pub mod submitter;
/// Engine facade
pub mod engine;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use engine::PositionEngine;
pub use error::{EngineError, Result};
pub use settings::Settings;
