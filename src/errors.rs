// src/errors.rs

use crate::pools::PoolType;

/// Structured error taxonomy shared across the router, pricing, and repository
/// layers. Variants carry enough context (heights, denoms, pool ids) for the
/// transport layer to map them to responses without reparsing messages.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("token in denom matches token out denom ({denom})")]
    SameDenom { denom: String },

    #[error("token in amount must be positive, got {amount}")]
    NonPositiveAmountIn { amount: rust_decimal::Decimal },

    #[error("no candidate routes found from {token_in_denom} to {token_out_denom}")]
    NoRoutes {
        token_in_denom: String,
        token_out_denom: String,
    },

    #[error("no route survived simulation from {token_in_denom} to {token_out_denom}")]
    NoViableRoute {
        token_in_denom: String,
        token_out_denom: String,
    },

    #[error("requested split across {requested} routes but only {available} ranked routes available")]
    InvalidSplit { requested: usize, available: usize },

    #[error("insufficient liquidity in pool ({pool_id})")]
    InsufficientLiquidity { pool_id: u64 },

    #[error("denom {denom} not found in pool ({pool_id})")]
    DenomNotInPool { pool_id: u64, denom: String },

    #[error("invalid pool type ({pool_type}) for pool ({pool_id})")]
    InvalidPoolType { pool_id: u64, pool_type: PoolType },

    #[error("price unavailable for base {base_denom} and quote {quote_denom}")]
    PriceUnavailable {
        base_denom: String,
        quote_denom: String,
    },

    #[error("price for {denom} is zero")]
    ZeroPrice { denom: String },

    #[error("scaling factor for {denom} is zero")]
    ZeroScalingFactor { denom: String },

    #[error("truncated capitalization for ({denom})")]
    TruncatedCoinCap { denom: String },

    #[error("external price source: {0}")]
    ExternalPriceSource(#[source] anyhow::Error),

    #[error("invalid pricing options: {reason}")]
    InvalidPricingOptions { reason: String },

    #[error("height ({stored_height}) is stale, time since last update ({time_since_last_update_secs}), max allowed ({max_allowed_time_delta_secs})")]
    StaleHeight {
        stored_height: u64,
        time_since_last_update_secs: u64,
        max_allowed_time_delta_secs: u64,
    },

    #[error("height check timed out after {timeout_ms}ms")]
    HeightCheckTimeout { timeout_ms: u64 },

    #[error("height source: {0}")]
    HeightSource(#[source] anyhow::Error),

    #[error("no tx in progress")]
    TxNotInProgress,

    #[error("invalid denom pair string key {key}. must have 2 denoms, had ({count})")]
    InvalidDenomPairKeyComponents { key: String, count: usize },

    #[error("invalid denom pair string key {key}. must be in increasing lexicographic order")]
    InvalidDenomPairKeyOrder { key: String },

    #[error("invalid taker fee string {value} for key {key}")]
    InvalidTakerFeeValue { key: String, value: String },

    #[error("route cache payload: {0}")]
    RouteCachePayload(#[from] bincode::Error),

    #[cfg(feature = "redis")]
    #[error("store: {0}")]
    Store(#[from] redis::RedisError),

    #[error("contract query: {0}")]
    ContractQuery(#[source] anyhow::Error),
}

impl SidecarError {
    /// True if the error is the freshness guard rejecting a stalled node.
    /// Transport layers map this to a distinct status from plain failures.
    pub fn is_stale_height(&self) -> bool {
        matches!(self, SidecarError::StaleHeight { .. })
    }
}
