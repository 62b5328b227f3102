//! # Sidecar Query SDK
//!
//! A Rust library for off-chain swap quoting and token pricing against an
//! Osmosis-style AMM chain. The SDK keeps an in-memory snapshot of the pool set
//! and answers routing and pricing queries without touching chain state on the
//! hot path.
//!
//! ## Overview
//!
//! The sidecar separates chain ingestion from query serving. It focuses on:
//!
//! - **Routing**: Candidate route discovery, hop simulation, ranking, and order splits
//! - **Pricing**: Spot and quote-based token prices behind a pluggable source trait
//! - **Freshness**: Chain height tracking that fails queries against stale state
//! - **Persistence**: Transactional Redis repository for ingested routing data
//!
//! ## Architecture
//!
//! The SDK is organized into several layers:
//!
//! ### Pool Layer
//! Unified pool representation (weighted, transmuter, generalized CosmWasm) behind
//! the `RoutablePool` trait, published wholesale as immutable snapshots so queries
//! never observe a half-updated pool set.
//!
//! ### Routing Layer
//! Discovers bounded candidate routes over the current snapshot, simulates each
//! hop, ranks routes by output amount, and optionally splits an order across
//! several routes when that beats the best single route.
//!
//! ### Pricing Layer
//! Computes token prices on demand or from a background worker that fans results
//! out to registered listeners. Prices come from on-chain pools or from CoinGecko.
//!
//! ### Storage Layer
//! Redis-backed repository with single-use transactions for taker fees and cached
//! candidate routes, plus a chain freshness guard for readiness checks.

// Core Types
/// Pool representations, snapshots, and the `RoutablePool` trait
pub mod pools;
/// CosmWasm contract query client and typed messages
pub mod contract_client;
/// Error taxonomy shared across the SDK
pub mod errors;

// Routing Layer
/// Route discovery, ranking, splitting, and route caches
pub mod router;
/// TTL cache backing the route and price caches
pub mod cache;

// Pricing Layer
/// Pricing primitives: options, sources, cache keys, coin capitalization
pub mod pricing;
/// Background price computation and listener fan-out
pub mod pricing_worker;
/// CoinGecko HTTP pricing source
pub mod coingecko;

// Chain State
/// Chain height tracking and staleness detection
pub mod chain_freshness;

// Infrastructure
/// Redis repository with single-use transactions (optional, feature-gated)
#[cfg(feature = "redis")]
pub mod repository;
/// Metrics and observability
pub mod metrics;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use chain_freshness::{ChainFreshnessGuard, ChainHeightStore};
pub use coingecko::CoinGeckoPricingSource;
pub use errors::SidecarError;
pub use pools::{Coin, PoolSnapshot, RoutablePool};
pub use pricing::{PricingOptions, PricingSource};
pub use pricing_worker::{ChainPricingSource, PricingWorker};
pub use router::route::Quote;
pub use router::Router;
pub use settings::Settings;
