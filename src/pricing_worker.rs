// src/pricing_worker.rs

//! # Pricing Worker
//!
//! Keeps a best-effort price table fresh without blocking callers.
//!
//! `update_prices_async` schedules one background computation per block
//! height and returns immediately; completion is observed through registered
//! listeners, never through a return value. Prices land in the source's
//! cache before any listener runs, so a listener reading the cache always
//! sees the update that triggered it. Overlapping updates for different
//! heights may race; the cache is last-write-wins by completion time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::errors::SidecarError;
use crate::metrics;
use crate::pools::{BlockPoolMetadata, Coin};
use crate::pricing::{
    format_pricing_cache_key, PricesResult, PricingOptions, PricingSource, PricingSourceType,
};
use crate::router::Router;
use crate::settings::PricingConfig;

/// Input size for the quote-based compute method. Large enough to dodge
/// truncation on heavily scaled denoms, small enough to keep slippage low.
const QUOTE_BASED_NOMINAL_AMOUNT: Decimal = dec!(1000000);

const PRICE_CACHE_MAX_ENTRIES: usize = 100_000;

/// Callback invoked when an asynchronous pricing update completes.
///
/// Registration is additive with no removal path, and the same height may
/// be delivered more than once, so implementations must be idempotent.
#[async_trait]
pub trait PricingUpdateListener: Send + Sync {
    async fn on_pricing_update(
        &self,
        height: u64,
        prices: &PricesResult,
        metadata: &BlockPoolMetadata,
        quote_denom: &str,
    );
}

/// Prices computed from on-chain pools via the router.
///
/// Two compute methods: a direct spot-price read against the most liquid
/// pool connecting the denoms, or a quote-based method that simulates a
/// nominal swap and derives the price from the in/out ratio (so it bakes in
/// fees and slippage). Results are cached under the canonical pair key.
pub struct ChainPricingSource {
    router: Arc<Router>,
    cache: Cache<Decimal>,
    cache_ttl: Duration,
}

impl ChainPricingSource {
    pub fn new(router: Arc<Router>, config: &PricingConfig) -> Self {
        Self {
            router,
            cache: Cache::new("chain_price", PRICE_CACHE_MAX_ENTRIES),
            cache_ttl: Duration::from_millis(config.cache_expiry_ms),
        }
    }

    /// Spot price from the most liquid pool holding both denoms.
    async fn compute_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
        min_liquidity: Option<Decimal>,
    ) -> Result<Decimal, SidecarError> {
        let snapshot = self.router.snapshot();
        let pool = snapshot
            .pools_with_denom(base_denom)
            .filter(|pool| pool.denoms().iter().any(|denom| denom == quote_denom))
            .filter(|pool| min_liquidity.map_or(true, |floor| pool.liquidity() >= floor))
            .max_by_key(|pool| pool.liquidity())
            .ok_or_else(|| SidecarError::PriceUnavailable {
                base_denom: base_denom.to_string(),
                quote_denom: quote_denom.to_string(),
            })?;

        pool.spot_price(base_denom, quote_denom).await
    }

    /// Price from a simulated nominal swap: output per unit of input.
    async fn compute_quote_based_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
        min_liquidity: Option<Decimal>,
    ) -> Result<Decimal, SidecarError> {
        let token_in = Coin::new(base_denom, QUOTE_BASED_NOMINAL_AMOUNT);
        let quote = self
            .router
            .get_quote_with_min_liquidity(
                &token_in,
                quote_denom,
                min_liquidity.unwrap_or(Decimal::ZERO),
            )
            .await
            .map_err(|err| match err {
                SidecarError::NoRoutes { .. } | SidecarError::NoViableRoute { .. } => {
                    SidecarError::PriceUnavailable {
                        base_denom: base_denom.to_string(),
                        quote_denom: quote_denom.to_string(),
                    }
                }
                other => other,
            })?;

        Ok(quote.amount_out.amount / QUOTE_BASED_NOMINAL_AMOUNT)
    }
}

#[async_trait]
impl PricingSource for ChainPricingSource {
    async fn get_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
        options: PricingOptions,
    ) -> Result<Decimal, SidecarError> {
        if let Some(floor) = options.min_liquidity {
            if floor < Decimal::ZERO {
                return Err(SidecarError::InvalidPricingOptions {
                    reason: format!("min_liquidity must be non-negative, got {floor}"),
                });
            }
        }
        if base_denom == quote_denom {
            return Ok(Decimal::ONE);
        }

        let cache_key = format_pricing_cache_key(base_denom, quote_denom);
        if !options.recompute_prices {
            if let Some(price) = self.cache.get(&cache_key) {
                return Ok(price);
            }
        }

        let price = if options.recompute_prices_is_spot_price_compute_method {
            self.compute_spot_price(base_denom, quote_denom, options.min_liquidity)
                .await?
        } else {
            self.compute_quote_based_price(base_denom, quote_denom, options.min_liquidity)
                .await?
        };

        self.cache.set(cache_key, price, Some(self.cache_ttl));
        debug!("💱 Chain price {base_denom}/{quote_denom}: {price}");
        Ok(price)
    }

    fn source_type(&self) -> PricingSourceType {
        PricingSourceType::Chain
    }
}

/// Fire-and-forget price updater with listener fan-out.
pub struct PricingWorker {
    source: Arc<dyn PricingSource>,
    quote_denom: String,
    listeners: RwLock<Vec<Arc<dyn PricingUpdateListener>>>,
}

impl PricingWorker {
    pub fn new(source: Arc<dyn PricingSource>, quote_denom: impl Into<String>) -> Self {
        Self {
            source,
            quote_denom: quote_denom.into(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn quote_denom(&self) -> &str {
        &self.quote_denom
    }

    /// Adds a listener. Listeners are never removed.
    pub async fn register_listener(&self, listener: Arc<dyn PricingUpdateListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Schedules a price recomputation for every denom updated at `height`
    /// and returns without waiting for it.
    ///
    /// The returned handle resolves when the computation and every listener
    /// callback have finished; production callers drop it, tests await it.
    pub fn update_prices_async(
        self: &Arc<Self>,
        height: u64,
        metadata: BlockPoolMetadata,
    ) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.compute_and_notify(height, metadata).await;
        })
    }

    async fn compute_and_notify(&self, height: u64, metadata: BlockPoolMetadata) {
        let started = Instant::now();
        let options = PricingOptions::default().with_recompute_prices();

        let computations = metadata
            .updated_denoms
            .iter()
            .filter(|denom| denom.as_str() != self.quote_denom)
            .map(|denom| async move {
                let result = self
                    .source
                    .get_price(denom, &self.quote_denom, options)
                    .await;
                (denom.clone(), result)
            });

        let mut prices: PricesResult = HashMap::new();
        for (denom, result) in join_all(computations).await {
            match result {
                Ok(price) => {
                    prices
                        .entry(denom)
                        .or_insert_with(HashMap::new)
                        .insert(self.quote_denom.clone(), price);
                }
                Err(err) => {
                    metrics::increment_pricing_compute_error(height);
                    warn!("⚠️ Price computation failed for {denom} at height {height}: {err}");
                }
            }
        }

        metrics::record_pricing_compute_duration(started.elapsed());
        debug!(
            "💱 Computed {} prices for height {height} in {:?}",
            prices.len(),
            started.elapsed()
        );

        // Every price is in the source cache by now; listeners observing the
        // cache see the full update.
        let listeners = self.listeners.read().await.clone();
        let notifications = listeners.iter().map(|listener| {
            listener.on_pricing_update(height, &prices, &metadata, &self.quote_denom)
        });
        join_all(notifications).await;
    }
}
