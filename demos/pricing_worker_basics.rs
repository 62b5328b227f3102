//! # Pricing Worker Example
//!
//! This example demonstrates background price computation over a pool snapshot:
//! - Chain pricing source setup
//! - Listener registration and fan-out
//! - Non-blocking price updates for a block
//! - On-demand price reads (cached, spot, quote-based)
//!
//! ## Prerequisites
//!
//! None. The example runs entirely in memory with a hand-built pool set.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example pricing_worker_basics
//! ```

use async_trait::async_trait;
use rust_decimal_macros::dec;
use sidecar_query_sdk::pools::{BlockPoolMetadata, Coin, PoolSnapshot, RoutablePool, WeightedPool};
use sidecar_query_sdk::pricing::{PricesResult, PricingOptions, PricingSource};
use sidecar_query_sdk::pricing_worker::{ChainPricingSource, PricingUpdateListener, PricingWorker};
use sidecar_query_sdk::router::Router;
use sidecar_query_sdk::settings::{PricingConfig, RouterConfig};
use std::sync::Arc;

struct PrintListener;

#[async_trait]
impl PricingUpdateListener for PrintListener {
    async fn on_pricing_update(
        &self,
        height: u64,
        prices: &PricesResult,
        _metadata: &BlockPoolMetadata,
        quote_denom: &str,
    ) {
        for (base, by_quote) in prices {
            if let Some(price) = by_quote.get(quote_denom) {
                println!("   [listener] height {height}: {base}/{quote_denom} = {price}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    println!("🚀 Building in-memory pool snapshot...");

    // 1. Hand-build a pool set priced against uusdc
    let pools: Vec<Arc<dyn RoutablePool>> = vec![
        Arc::new(WeightedPool::new(
            1,
            vec![
                Coin::new("uatom", dec!(100000000)),
                Coin::new("uusdc", dec!(400000000)),
            ],
            dec!(0.002),
            dec!(0.001),
            dec!(500000000),
        )),
        Arc::new(WeightedPool::new(
            2,
            vec![
                Coin::new("uosmo", dec!(1000000)),
                Coin::new("uusdc", dec!(500000)),
            ],
            dec!(0.002),
            dec!(0.001),
            dec!(1500000),
        )),
    ];
    let snapshot = PoolSnapshot::new(pools, &[], 101);
    println!("✅ Snapshot built at height {}", snapshot.height());

    // 2. Router and chain pricing source
    let router = Arc::new(Router::new(RouterConfig::default()));
    router.update_snapshot(snapshot);
    let source = Arc::new(ChainPricingSource::new(
        Arc::clone(&router),
        &PricingConfig::default(),
    ));
    println!("✅ Chain pricing source ready");

    // 3. Worker with a listener that prints every published price
    let worker = Arc::new(PricingWorker::new(
        Arc::clone(&source) as Arc<dyn PricingSource>,
        "uusdc",
    ));
    worker.register_listener(Arc::new(PrintListener)).await;
    println!("✅ Listener registered");

    // 4. Kick off a non-blocking update for the denoms touched at this height.
    //    Production callers drop the handle; we await it so the output is ordered.
    let mut metadata = BlockPoolMetadata::new(101);
    metadata.updated_denoms.insert("uatom".to_string());
    metadata.updated_denoms.insert("uosmo".to_string());
    worker.update_prices_async(101, metadata).await?;
    println!("✅ Price update completed");

    // 5. Cached read: served from the worker's pass above, no recompute
    let cached = source
        .get_price("uatom", "uusdc", PricingOptions::default())
        .await?;
    println!("✅ Cached uatom/uusdc price: {cached}");

    // 6. Quote-based read: routes a nominal amount through the router instead
    //    of taking the most liquid pool's spot price
    let quote_based = source
        .get_price(
            "uatom",
            "uusdc",
            PricingOptions::default().with_recompute_prices_quote_based_method(),
        )
        .await?;
    println!("✅ Quote-based uatom/uusdc price: {quote_based}");

    println!("\n🎉 Pricing worker demo complete!");

    Ok(())
}
