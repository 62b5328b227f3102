// src/router/mod.rs

//! # Router
//!
//! Answers quote queries over the current pool snapshot.
//!
//! ## Overview
//!
//! A quote runs a four-stage pipeline:
//! - **Discovery**: breadth-first traversal of the pool graph from the input
//!   denom, bounded by hop count and route count, visiting pools in
//!   preferred-then-TVL order
//! - **Filtering**: drops routes reusing a pool id already claimed by a
//!   higher-ranked route, and pools below the liquidity floor
//! - **Estimation**: simulates every surviving route hop by hop; a failed
//!   hop eliminates that route only
//! - **Ranking and splitting**: orders by output, then tries to do better by
//!   splitting the input across the top routes
//!
//! ## Caching
//!
//! With `route_cache_enabled`, candidate routes are cached per denom pair
//! and ranked routes per (denom pair, input order of magnitude). Entries
//! expire by TTL or when the snapshot height crosses
//! `route_update_height_interval`; contents are never inspected.

pub mod route;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::debug;

use crate::cache::Cache;
use crate::errors::SidecarError;
use crate::metrics;
use crate::pools::{Coin, PoolSnapshot};
use crate::settings::RouterConfig;
use route::{
    convert_ranked_to_candidate_routes, CandidatePool, CandidateRoute, CandidateRoutes, Quote,
    Route, RoutePool, RouteWithOutAmount,
};

const ROUTE_CACHE_MAX_ENTRIES: usize = 50_000;

pub fn format_route_cache_key(token_in_denom: &str, token_out_denom: &str) -> String {
    format!("{token_in_denom}/{token_out_denom}")
}

pub fn format_ranked_route_cache_key(
    token_in_denom: &str,
    token_out_denom: &str,
    order_of_magnitude: usize,
) -> String {
    format!("{token_in_denom}/{token_out_denom}/{order_of_magnitude}")
}

/// Number of integer digits minus one; anything below one is magnitude zero.
/// Buckets input amounts so ranked routes are shared across similar sizes.
pub fn order_of_magnitude(amount: Decimal) -> usize {
    amount.abs().trunc().to_string().len().saturating_sub(1)
}

/// Keeps the first route claiming each pool id, in list order.
///
/// Idempotent: a second pass over already-filtered routes is a no-op.
pub fn filter_duplicate_pool_id_routes(candidates: CandidateRoutes) -> CandidateRoutes {
    CandidateRoutes::from_routes(dedup_by_pool_ids(candidates.routes, CandidateRoute::pool_ids))
}

fn dedup_by_pool_ids<T>(items: Vec<T>, pool_ids_of: impl Fn(&T) -> Vec<u64>) -> Vec<T> {
    let mut claimed: HashSet<u64> = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let ids = pool_ids_of(&item);
        if ids.iter().any(|id| claimed.contains(id)) {
            continue;
        }
        claimed.extend(ids);
        kept.push(item);
    }
    kept
}

/// Route query service over an atomically replaceable pool snapshot.
///
/// Readers always see a complete snapshot; the ingest side publishes a new
/// one per height via [`Router::update_snapshot`].
pub struct Router {
    config: RouterConfig,
    pools: ArcSwap<PoolSnapshot>,
    candidate_route_cache: Option<Cache<CandidateRoutes>>,
    ranked_route_cache: Option<Cache<CandidateRoutes>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let (candidate_route_cache, ranked_route_cache) = if config.route_cache_enabled {
            (
                Some(Cache::new("candidate_route", ROUTE_CACHE_MAX_ENTRIES)),
                Some(Cache::new("ranked_route", ROUTE_CACHE_MAX_ENTRIES)),
            )
        } else {
            (None, None)
        };

        Self {
            config,
            pools: ArcSwap::from_pointee(PoolSnapshot::empty()),
            candidate_route_cache,
            ranked_route_cache,
        }
    }

    /// Publishes a new snapshot. Route caches flush when the height crosses
    /// a `route_update_height_interval` boundary.
    pub fn update_snapshot(&self, snapshot: PoolSnapshot) {
        let started = std::time::Instant::now();
        let new_height = snapshot.height();
        let previous = self.pools.swap(Arc::new(snapshot));

        let interval = self.config.route_update_height_interval;
        if interval > 0 && new_height / interval != previous.height() / interval {
            if let Some(cache) = &self.candidate_route_cache {
                cache.clear();
            }
            if let Some(cache) = &self.ranked_route_cache {
                cache.clear();
            }
            debug!("Flushed route caches at height {new_height}");
        }
        metrics::record_process_block_duration(started.elapsed());
    }

    pub fn snapshot(&self) -> Arc<PoolSnapshot> {
        self.pools.load_full()
    }

    /// Best quote for swapping `token_in` into `token_out_denom`, using the
    /// configured liquidity floor.
    pub async fn get_quote(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
    ) -> Result<Quote, SidecarError> {
        self.get_quote_with_min_liquidity(
            token_in,
            token_out_denom,
            Decimal::from(self.config.min_pool_liquidity),
        )
        .await
    }

    /// Quote with an explicit liquidity floor; a zero floor disables the
    /// filter entirely. Used by pricing, which carries its own floor option.
    pub async fn get_quote_with_min_liquidity(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
        min_liquidity: Decimal,
    ) -> Result<Quote, SidecarError> {
        if token_in.denom == token_out_denom {
            return Err(SidecarError::SameDenom {
                denom: token_in.denom.clone(),
            });
        }
        if token_in.amount <= Decimal::ZERO {
            return Err(SidecarError::NonPositiveAmountIn {
                amount: token_in.amount,
            });
        }

        let snapshot = self.pools.load_full();
        let ranked_key = format_ranked_route_cache_key(
            &token_in.denom,
            token_out_denom,
            order_of_magnitude(token_in.amount),
        );

        let cached_ranked = self
            .ranked_route_cache
            .as_ref()
            .and_then(|cache| cache.get(&ranked_key));
        let from_ranked_cache = cached_ranked.is_some();

        let candidates = match cached_ranked {
            Some(cached) => cached,
            None if min_liquidity == Decimal::from(self.config.min_pool_liquidity) => {
                self.get_candidate_routes(&token_in.denom, token_out_denom)?
            }
            // The candidate cache is keyed by denom pair only, so lookups
            // with a non-default floor bypass it.
            None => self.discover_candidate_routes(
                &snapshot,
                &token_in.denom,
                token_out_denom,
                min_liquidity,
            ),
        };
        if candidates.is_empty() {
            return Err(SidecarError::NoRoutes {
                token_in_denom: token_in.denom.clone(),
                token_out_denom: token_out_denom.to_string(),
            });
        }

        let routes = hydrate_routes(&snapshot, &candidates);
        let mut ranked = self.estimate_routes(routes, token_in).await;
        if ranked.is_empty() {
            return Err(SidecarError::NoViableRoute {
                token_in_denom: token_in.denom.clone(),
                token_out_denom: token_out_denom.to_string(),
            });
        }
        rank_routes(&mut ranked);

        if !from_ranked_cache {
            if let Some(cache) = &self.ranked_route_cache {
                cache.set(
                    ranked_key,
                    convert_ranked_to_candidate_routes(&ranked),
                    Some(self.route_cache_ttl()),
                );
            }
        }

        let deduped = dedup_by_pool_ids(ranked, |entry| entry.route.pool_ids());
        let best_single = deduped[0].clone();

        let split_routes = self.config.max_split_routes.min(deduped.len());
        let chosen = if split_routes > 1 {
            match self
                .split_across_routes(&deduped, split_routes, token_in)
                .await?
            {
                Some(split) => split,
                None => vec![best_single],
            }
        } else {
            vec![best_single]
        };

        Quote::from_routes(token_in.clone(), token_out_denom, chosen).await
    }

    /// Candidate routes for a denom pair, served from cache when enabled.
    pub fn get_candidate_routes(
        &self,
        token_in_denom: &str,
        token_out_denom: &str,
    ) -> Result<CandidateRoutes, SidecarError> {
        if token_in_denom == token_out_denom {
            return Err(SidecarError::SameDenom {
                denom: token_in_denom.to_string(),
            });
        }

        let key = format_route_cache_key(token_in_denom, token_out_denom);
        if let Some(cache) = &self.candidate_route_cache {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached);
            }
        }

        let snapshot = self.pools.load_full();
        let candidates = self.discover_candidate_routes(
            &snapshot,
            token_in_denom,
            token_out_denom,
            Decimal::from(self.config.min_pool_liquidity),
        );

        if let Some(cache) = &self.candidate_route_cache {
            cache.set(key, candidates.clone(), Some(self.route_cache_ttl()));
        }
        Ok(candidates)
    }

    /// Breadth-first route discovery, bounded by `max_pools_per_route` hops
    /// and `max_routes` results.
    ///
    /// Pools are visited in snapshot order (preferred first, then TVL
    /// descending), so shorter and deeper routes surface before longer and
    /// thinner ones. Preferred pools stay in even below the liquidity floor.
    fn discover_candidate_routes(
        &self,
        snapshot: &PoolSnapshot,
        token_in_denom: &str,
        token_out_denom: &str,
        min_liquidity: Decimal,
    ) -> CandidateRoutes {
        let max_routes = self.config.max_routes;
        let max_hops = self.config.max_pools_per_route;

        let mut routes: Vec<CandidateRoute> = Vec::new();
        let mut queue: VecDeque<(String, Vec<CandidatePool>)> = VecDeque::new();
        queue.push_back((token_in_denom.to_string(), Vec::new()));

        'search: while let Some((current_denom, path)) = queue.pop_front() {
            if path.len() >= max_hops {
                continue;
            }
            for pool in snapshot.pools_with_denom(&current_denom) {
                let preferred = self.config.preferred_pool_ids.contains(&pool.id());
                if !preferred && pool.liquidity() < min_liquidity {
                    continue;
                }
                if path.iter().any(|hop| hop.id == pool.id()) {
                    continue;
                }
                for next_denom in pool.denoms() {
                    // No cycles: never step back to the origin or to a denom
                    // already traversed on this path.
                    if next_denom == current_denom || next_denom == token_in_denom {
                        continue;
                    }
                    if path.iter().any(|hop| hop.token_out_denom == next_denom) {
                        continue;
                    }

                    let mut next_path = path.clone();
                    next_path.push(CandidatePool {
                        id: pool.id(),
                        token_out_denom: next_denom.clone(),
                    });

                    if next_denom == token_out_denom {
                        routes.push(CandidateRoute { pools: next_path });
                        if routes.len() >= max_routes {
                            break 'search;
                        }
                    } else {
                        queue.push_back((next_denom, next_path));
                    }
                }
            }
        }

        debug!(
            "Discovered {} candidate routes from {token_in_denom} to {token_out_denom}",
            routes.len()
        );
        CandidateRoutes::from_routes(routes)
    }

    /// Simulates every route with the full input, dropping the ones that
    /// fail a hop.
    async fn estimate_routes(
        &self,
        routes: Vec<Route>,
        token_in: &Coin,
    ) -> Vec<RouteWithOutAmount> {
        let simulations = routes.into_iter().map(|route| async move {
            let result = route.calculate_token_out(token_in).await;
            (route, result)
        });

        let mut estimated = Vec::new();
        for (route, result) in join_all(simulations).await {
            match result {
                Ok(out) => estimated.push(RouteWithOutAmount {
                    route,
                    in_amount: token_in.amount,
                    out_amount: out.amount,
                }),
                Err(err) => debug!("Dropping route [{route}] after failed simulation: {err}"),
            }
        }
        estimated
    }

    /// Greedy re-allocation of the input across the top `requested` routes.
    ///
    /// The input is cut into `max_split_iterations` equal chunks and each
    /// chunk goes to the route with the best marginal output at its current
    /// allocation. The exact heuristic is a tunable; the contract is that
    /// `None` is returned unless the aggregate output strictly beats the
    /// best single route.
    async fn split_across_routes(
        &self,
        ranked: &[RouteWithOutAmount],
        requested: usize,
        token_in: &Coin,
    ) -> Result<Option<Vec<RouteWithOutAmount>>, SidecarError> {
        if requested > ranked.len() {
            return Err(SidecarError::InvalidSplit {
                requested,
                available: ranked.len(),
            });
        }
        if requested < 2 {
            return Ok(None);
        }

        let top = &ranked[..requested];
        let iterations = self.config.max_split_iterations.max(1);
        let chunk = token_in.amount / Decimal::from(iterations as u64);
        if chunk.is_zero() {
            return Ok(None);
        }

        let mut allocations = vec![Decimal::ZERO; top.len()];
        let mut outputs = vec![Decimal::ZERO; top.len()];
        let mut remaining = token_in.amount;

        for i in 0..iterations {
            let amount = if i == iterations - 1 { remaining } else { chunk };

            // (route index, total output at the trial allocation, marginal gain)
            let mut best: Option<(usize, Decimal, Decimal)> = None;
            for (idx, entry) in top.iter().enumerate() {
                let trial_in = Coin::new(token_in.denom.clone(), allocations[idx] + amount);
                let trial_out = match entry.route.calculate_token_out(&trial_in).await {
                    Ok(out) => out.amount,
                    Err(_) => continue,
                };
                let marginal = trial_out - outputs[idx];
                let improves = match best {
                    Some((_, _, best_marginal)) => marginal > best_marginal,
                    None => true,
                };
                if improves {
                    best = Some((idx, trial_out, marginal));
                }
            }

            match best {
                Some((idx, trial_out, _)) => {
                    allocations[idx] += amount;
                    outputs[idx] = trial_out;
                    remaining -= amount;
                }
                None => break,
            }
        }

        // Fall back to the single route if any input could not be placed.
        if remaining > Decimal::ZERO {
            return Ok(None);
        }

        let aggregate: Decimal = outputs.iter().copied().sum();
        let best_single = ranked[0].out_amount;
        if aggregate <= best_single {
            debug!("Split output ({aggregate}) does not beat best single route ({best_single})");
            return Ok(None);
        }

        let split = top
            .iter()
            .zip(allocations.into_iter().zip(outputs))
            .filter(|(_, (allocation, _))| *allocation > Decimal::ZERO)
            .map(|(entry, (allocation, output))| RouteWithOutAmount {
                route: entry.route.clone(),
                in_amount: allocation,
                out_amount: output,
            })
            .collect();
        Ok(Some(split))
    }

    fn route_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.route_cache_expiry_seconds)
    }
}

/// Output descending; fewer hops break ties. The sort is stable, so
/// remaining ties keep discovery order (preferred and high-TVL pools first).
fn rank_routes(ranked: &mut [RouteWithOutAmount]) {
    ranked.sort_by(|a, b| {
        b.out_amount
            .cmp(&a.out_amount)
            .then(a.route.len().cmp(&b.route.len()))
    });
}

/// Resolves candidate routes against the given snapshot, dropping routes
/// whose pools are gone or no longer hold the expected denom.
fn hydrate_routes(snapshot: &PoolSnapshot, candidates: &CandidateRoutes) -> Vec<Route> {
    let mut routes = Vec::with_capacity(candidates.routes.len());
    'candidate: for candidate in &candidates.routes {
        let mut pools = Vec::with_capacity(candidate.pools.len());
        for hop in &candidate.pools {
            let pool = match snapshot.pool_by_id(hop.id) {
                Some(pool) => pool,
                None => {
                    debug!(
                        "Dropping cached route: pool ({}) absent from snapshot at height {}",
                        hop.id,
                        snapshot.height()
                    );
                    continue 'candidate;
                }
            };
            if !pool.denoms().iter().any(|denom| denom == &hop.token_out_denom) {
                debug!(
                    "Dropping cached route: pool ({}) no longer holds {}",
                    hop.id, hop.token_out_denom
                );
                continue 'candidate;
            }
            pools.push(RoutePool {
                pool: pool.clone(),
                token_out_denom: hop.token_out_denom.clone(),
            });
        }
        routes.push(Route::new(pools));
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::{RoutablePool, WeightedPool};
    use rust_decimal_macros::dec;

    fn pool(
        id: u64,
        denom_a: &str,
        amount_a: Decimal,
        denom_b: &str,
        amount_b: Decimal,
        liquidity: Decimal,
    ) -> Arc<dyn RoutablePool> {
        Arc::new(WeightedPool::new(
            id,
            vec![Coin::new(denom_a, amount_a), Coin::new(denom_b, amount_b)],
            Decimal::ZERO,
            Decimal::ZERO,
            liquidity,
        ))
    }

    fn base_config() -> RouterConfig {
        RouterConfig {
            max_pools_per_route: 2,
            max_routes: 5,
            max_split_routes: 3,
            max_split_iterations: 10,
            min_pool_liquidity: 10_000,
            ..RouterConfig::default()
        }
    }

    /// A/B with TVL 1M, B/C with TVL 500k, and a thin A/C direct pool with
    /// TVL 10k.
    fn three_pool_router(config: RouterConfig) -> Router {
        let pools = vec![
            pool(1, "a", dec!(500000), "b", dec!(500000), dec!(1000000)),
            pool(2, "b", dec!(250000), "c", dec!(250000), dec!(500000)),
            pool(3, "a", dec!(5000), "c", dec!(5000), dec!(10000)),
        ];
        let router = Router::new(config);
        router.update_snapshot(PoolSnapshot::new(pools, &[], 1));
        router
    }

    #[test]
    fn test_discovery_finds_direct_and_multi_hop_routes() {
        let router = three_pool_router(base_config());
        let candidates = router.get_candidate_routes("a", "c").unwrap();

        let pool_id_paths: Vec<Vec<u64>> =
            candidates.routes.iter().map(|r| r.pool_ids()).collect();
        assert!(pool_id_paths.contains(&vec![3]), "direct route missing");
        assert!(pool_id_paths.contains(&vec![1, 2]), "two-hop route missing");
        assert_eq!(candidates.len(), 2);
        assert!(candidates.unique_pool_ids.contains(&3));
    }

    #[tokio::test]
    async fn test_quote_prefers_deep_two_hop_over_thin_direct() {
        let router = three_pool_router(base_config());
        let quote = router
            .get_quote(&Coin::new("a", dec!(1000)), "c")
            .await
            .unwrap();

        // The thin direct pool loses ~17% to slippage; the deep two-hop path
        // loses well under 1%, and splitting toward the thin pool never
        // beats routing everything through the deep path.
        assert_eq!(quote.routes.len(), 1);
        assert_eq!(quote.routes[0].route.pool_ids(), vec![1, 2]);
        assert!(quote.amount_out.amount > dec!(990));
        assert!(quote.amount_out.amount < dec!(1000));
        assert_eq!(quote.amount_in, Coin::new("a", dec!(1000)));
        assert_eq!(quote.amount_out.denom, "c");
    }

    #[tokio::test]
    async fn test_split_beats_single_route_across_parallel_pools() {
        let pools = vec![
            pool(10, "a", dec!(50000), "c", dec!(50000), dec!(100000)),
            pool(11, "a", dec!(40000), "c", dec!(40000), dec!(80000)),
        ];
        let router = Router::new(base_config());
        router.update_snapshot(PoolSnapshot::new(pools, &[], 1));

        let token_in = Coin::new("a", dec!(10000));
        let quote = router.get_quote(&token_in, "c").await.unwrap();

        // Best single route: 50000 * 10000 / 60000.
        let best_single = dec!(50000) * dec!(10000) / dec!(60000);
        assert_eq!(quote.routes.len(), 2, "expected a split");
        assert!(
            quote.amount_out.amount > best_single,
            "split {} must beat single {}",
            quote.amount_out.amount,
            best_single
        );
        let allocated: Decimal = quote.routes.iter().map(|r| r.in_amount).sum();
        assert_eq!(allocated, token_in.amount);
    }

    #[tokio::test]
    async fn test_quote_errors() {
        let router = three_pool_router(base_config());

        let err = router
            .get_quote(&Coin::new("a", dec!(100)), "z")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoRoutes { .. }), "{err}");

        let err = router
            .get_quote(&Coin::new("a", dec!(100)), "a")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::SameDenom { .. }), "{err}");

        let err = router
            .get_quote(&Coin::new("a", Decimal::ZERO), "c")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NonPositiveAmountIn { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_route_failing_simulation_yields_no_viable_route() {
        // The pool passes the TVL floor but holds nothing of the out denom,
        // so discovery finds it and simulation rejects it.
        let pools = vec![pool(20, "a", dec!(1000), "c", dec!(0), dec!(1000000))];
        let router = Router::new(base_config());
        router.update_snapshot(PoolSnapshot::new(pools, &[], 1));

        let err = router
            .get_quote(&Coin::new("a", dec!(100)), "c")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoViableRoute { .. }), "{err}");
    }

    #[test]
    fn test_preferred_pool_survives_liquidity_floor() {
        let thin = vec![pool(42, "a", dec!(50), "c", dec!(50), dec!(100))];

        let mut config = base_config();
        config.preferred_pool_ids = vec![42];
        let router = Router::new(config);
        router.update_snapshot(PoolSnapshot::new(thin.clone(), &[42], 1));
        assert_eq!(router.get_candidate_routes("a", "c").unwrap().len(), 1);

        let router = Router::new(base_config());
        router.update_snapshot(PoolSnapshot::new(thin, &[], 1));
        assert!(router.get_candidate_routes("a", "c").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_pool_filter_keeps_first_and_is_idempotent() {
        let candidates = CandidateRoutes::from_routes(vec![
            CandidateRoute {
                pools: vec![
                    CandidatePool { id: 1, token_out_denom: "b".into() },
                    CandidatePool { id: 2, token_out_denom: "c".into() },
                ],
            },
            CandidateRoute {
                pools: vec![
                    CandidatePool { id: 2, token_out_denom: "b".into() },
                    CandidatePool { id: 3, token_out_denom: "c".into() },
                ],
            },
            CandidateRoute {
                pools: vec![CandidatePool { id: 4, token_out_denom: "c".into() }],
            },
        ]);

        let filtered = filter_duplicate_pool_id_routes(candidates);
        let paths: Vec<Vec<u64>> = filtered.routes.iter().map(|r| r.pool_ids()).collect();
        assert_eq!(paths, vec![vec![1, 2], vec![4]]);

        let again = filter_duplicate_pool_id_routes(filtered.clone());
        assert_eq!(again, filtered);
    }

    #[tokio::test]
    async fn test_split_request_beyond_available_routes_errors() {
        let router = three_pool_router(base_config());
        let snapshot = router.snapshot();
        let candidates = router.get_candidate_routes("a", "c").unwrap();
        let routes = hydrate_routes(&snapshot, &candidates);
        let token_in = Coin::new("a", dec!(100));
        let estimated = router.estimate_routes(routes, &token_in).await;

        let err = router
            .split_across_routes(&estimated, estimated.len() + 1, &token_in)
            .await
            .unwrap_err();
        assert!(
            matches!(err, SidecarError::InvalidSplit { requested, available }
                if requested == estimated.len() + 1 && available == estimated.len()),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_ranked_cache_outlives_snapshot_swap() {
        let mut config = base_config();
        config.route_cache_enabled = true;
        config.route_cache_expiry_seconds = 600;
        let router = three_pool_router(config);

        router
            .get_quote(&Coin::new("a", dec!(100)), "c")
            .await
            .unwrap();
        assert_eq!(router.candidate_route_cache.as_ref().unwrap().len(), 1);
        assert_eq!(router.ranked_route_cache.as_ref().unwrap().len(), 1);

        // Swap in a snapshot without the cached pools: the ranked cache still
        // answers, and hydration dropping every route proves the candidates
        // came from the cache rather than fresh discovery.
        router.update_snapshot(PoolSnapshot::new(vec![], &[], 2));
        let err = router
            .get_quote(&Coin::new("a", dec!(100)), "c")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoViableRoute { .. }), "{err}");

        // Without the cache the same query cannot even find candidates.
        let router = Router::new(base_config());
        router.update_snapshot(PoolSnapshot::new(vec![], &[], 2));
        let err = router
            .get_quote(&Coin::new("a", dec!(100)), "c")
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoRoutes { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_height_interval_flushes_route_caches() {
        let mut config = base_config();
        config.route_cache_enabled = true;
        config.route_cache_expiry_seconds = 600;
        config.route_update_height_interval = 10;
        let router = three_pool_router(config);

        router
            .get_quote(&Coin::new("a", dec!(100)), "c")
            .await
            .unwrap();
        assert_eq!(router.ranked_route_cache.as_ref().unwrap().len(), 1);

        // Height 1 -> 5 stays inside the interval window.
        router.update_snapshot(PoolSnapshot::new(
            vec![pool(1, "a", dec!(500000), "b", dec!(500000), dec!(1000000))],
            &[],
            5,
        ));
        assert_eq!(router.ranked_route_cache.as_ref().unwrap().len(), 1);

        // Height 5 -> 10 crosses it.
        router.update_snapshot(PoolSnapshot::new(vec![], &[], 10));
        assert_eq!(router.ranked_route_cache.as_ref().unwrap().len(), 0);
        assert_eq!(router.candidate_route_cache.as_ref().unwrap().len(), 0);
    }

    #[test]
    fn test_order_of_magnitude_buckets() {
        assert_eq!(order_of_magnitude(dec!(0.5)), 0);
        assert_eq!(order_of_magnitude(dec!(1)), 0);
        assert_eq!(order_of_magnitude(dec!(999)), 2);
        assert_eq!(order_of_magnitude(dec!(1000)), 3);
    }

    #[test]
    fn test_cache_key_formats() {
        assert_eq!(format_route_cache_key("uatom", "uosmo"), "uatom/uosmo");
        assert_eq!(
            format_ranked_route_cache_key("uatom", "uosmo", 3),
            "uatom/uosmo/3"
        );
    }
}
