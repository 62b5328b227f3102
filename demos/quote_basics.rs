//! # Basic Quote Example
//!
//! This example demonstrates how to serve swap quotes from an in-memory pool
//! snapshot:
//! - Router configuration
//! - Snapshot publication
//! - Candidate route discovery
//! - Quote with per-route breakdown
//!
//! ## Prerequisites
//!
//! None. The example runs entirely in memory with a hand-built pool set.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example quote_basics
//! ```

use rust_decimal_macros::dec;
use sidecar_query_sdk::pools::{Coin, PoolSnapshot, RoutablePool, WeightedPool};
use sidecar_query_sdk::router::Router;
use sidecar_query_sdk::settings::RouterConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    println!("🚀 Building in-memory pool snapshot...");

    // 1. Hand-build a small pool set: a direct uatom/uusdc pool plus a deeper
    //    two-hop path through uosmo
    let pools: Vec<Arc<dyn RoutablePool>> = vec![
        Arc::new(WeightedPool::new(
            1,
            vec![
                Coin::new("uatom", dec!(200000)),
                Coin::new("uusdc", dec!(800000)),
            ],
            dec!(0.003),
            dec!(0.001),
            dec!(1000000),
        )),
        Arc::new(WeightedPool::new(
            2,
            vec![
                Coin::new("uatom", dec!(5000000)),
                Coin::new("uosmo", dec!(20000000)),
            ],
            dec!(0.002),
            dec!(0.001),
            dec!(25000000),
        )),
        Arc::new(WeightedPool::new(
            3,
            vec![
                Coin::new("uosmo", dec!(30000000)),
                Coin::new("uusdc", dec!(7500000)),
            ],
            dec!(0.002),
            dec!(0.001),
            dec!(37500000),
        )),
    ];
    let snapshot = PoolSnapshot::new(pools, &[], 100);
    println!("✅ Snapshot built at height {}", snapshot.height());

    // 2. Create the router and publish the snapshot
    let router = Router::new(RouterConfig::default());
    router.update_snapshot(snapshot);
    println!("✅ Router ready");

    // 3. Discover candidate routes for the pair
    let candidates = router.get_candidate_routes("uatom", "uusdc")?;
    println!("✅ {} candidate route(s) discovered", candidates.len());

    // 4. Ask for a quote
    let token_in = Coin::new("uatom", dec!(10000));
    let quote = router.get_quote(&token_in, "uusdc").await?;
    println!(
        "✅ Quote: {} {} -> {} {}",
        quote.amount_in.amount, quote.amount_in.denom, quote.amount_out.amount, quote.amount_out.denom
    );

    // 5. Inspect the chosen route(s)
    for route in &quote.routes {
        println!(
            "   route {} in={} out={}",
            route.route, route.in_amount, route.out_amount
        );
    }
    println!("   effective fee: {}", quote.effective_fee);
    println!("   spot price:    {}", quote.in_base_out_quote_spot_price);
    println!("   price impact:  {}", quote.price_impact);

    println!("\n🎉 Quote served!");

    Ok(())
}
