// src/router/route.rs

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::SidecarError;
use crate::pools::{Coin, RoutablePool};

/// One hop of a route: a pool plus the denom the swap exits through.
#[derive(Debug, Clone)]
pub struct RoutePool {
    pub pool: Arc<dyn RoutablePool>,
    pub token_out_denom: String,
}

/// An ordered sequence of pools from an input denom to an output denom.
///
/// Consecutive hops share a denom and no pool id repeats. Routes are built
/// by hydrating [`CandidateRoute`]s against the current snapshot, so they
/// hold live pool state and are not serialized.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub pools: Vec<RoutePool>,
}

impl Route {
    pub fn new(pools: Vec<RoutePool>) -> Self {
        Self { pools }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn token_out_denom(&self) -> Option<&str> {
        self.pools.last().map(|hop| hop.token_out_denom.as_str())
    }

    pub fn pool_ids(&self) -> Vec<u64> {
        self.pools.iter().map(|hop| hop.pool.id()).collect()
    }

    /// Simulates the swap hop by hop. Each hop charges its taker fee on the
    /// way in, then runs the pool math; the output becomes the next input.
    pub async fn calculate_token_out(&self, token_in: &Coin) -> Result<Coin, SidecarError> {
        let mut current = token_in.clone();
        for hop in &self.pools {
            let after_fee = hop.pool.charge_taker_fee_exact_in(&current);
            current = hop
                .pool
                .calculate_token_out(&after_fee, &hop.token_out_denom)
                .await?;
        }
        Ok(current)
    }

    /// Zero-trade-size price of the route's output denom per unit of
    /// `token_in_denom`: the product of the per-hop spot prices.
    pub async fn spot_price(&self, token_in_denom: &str) -> Result<Decimal, SidecarError> {
        let mut current_denom = token_in_denom.to_string();
        let mut spot = Decimal::ONE;
        for hop in &self.pools {
            spot *= hop
                .pool
                .spot_price(&current_denom, &hop.token_out_denom)
                .await?;
            current_denom = hop.token_out_denom.clone();
        }
        Ok(spot)
    }

    /// Sum of taker fee and spread factor across the route's pools.
    pub fn effective_fee(&self) -> Decimal {
        self.pools
            .iter()
            .map(|hop| hop.pool.taker_fee() + hop.pool.spread_factor())
            .sum()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.pools.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "({}) {}", hop.pool.id(), hop.token_out_denom)?;
        }
        Ok(())
    }
}

/// One hop of a candidate route, by pool id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePool {
    pub id: u64,
    pub token_out_denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRoute {
    pub pools: Vec<CandidatePool>,
}

impl CandidateRoute {
    pub fn pool_ids(&self) -> Vec<u64> {
        self.pools.iter().map(|pool| pool.id).collect()
    }
}

/// Discovery output: routes by pool id, detached from any snapshot.
///
/// This is the shape that gets cached (in process and in Redis), so it
/// carries no pool state and re-hydrates against whatever snapshot is
/// current when it is used.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateRoutes {
    pub routes: Vec<CandidateRoute>,
    pub unique_pool_ids: IndexSet<u64>,
}

impl CandidateRoutes {
    pub fn from_routes(routes: Vec<CandidateRoute>) -> Self {
        let unique_pool_ids = routes
            .iter()
            .flat_map(|route| route.pools.iter().map(|pool| pool.id))
            .collect();
        Self {
            routes,
            unique_pool_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A route annotated with the portion of the input allocated to it and the
/// simulated output for that portion. Transient ranking state.
#[derive(Debug, Clone)]
pub struct RouteWithOutAmount {
    pub route: Route,
    pub in_amount: Decimal,
    pub out_amount: Decimal,
}

/// Ranked routes converted back to their snapshot-independent form, for the
/// ranked-route cache.
pub fn convert_ranked_to_candidate_routes(ranked: &[RouteWithOutAmount]) -> CandidateRoutes {
    let routes = ranked
        .iter()
        .map(|entry| CandidateRoute {
            pools: entry
                .route
                .pools
                .iter()
                .map(|hop| CandidatePool {
                    id: hop.pool.id(),
                    token_out_denom: hop.token_out_denom.clone(),
                })
                .collect(),
        })
        .collect();
    CandidateRoutes::from_routes(routes)
}

/// The final answer to a route query. Immutable once returned.
#[derive(Debug, Clone)]
pub struct Quote {
    pub amount_in: Coin,
    pub amount_out: Coin,
    /// The routes used; a split has more than one entry.
    pub routes: Vec<RouteWithOutAmount>,
    /// Input-weighted sum of per-route fees (taker + spread per pool).
    pub effective_fee: Decimal,
    /// Relative gap between the execution price and the spot price.
    /// Negative under normal conditions.
    pub price_impact: Decimal,
    /// Input-weighted spot price of the output denom per unit of input.
    pub in_base_out_quote_spot_price: Decimal,
}

impl Quote {
    /// Assembles a quote from simulated routes.
    ///
    /// Fees and the spot price are weighted by each route's share of the
    /// input. A route whose spot price cannot be computed falls back to its
    /// own execution price rather than failing a quote that already
    /// simulated successfully.
    pub async fn from_routes(
        token_in: Coin,
        token_out_denom: &str,
        routes: Vec<RouteWithOutAmount>,
    ) -> Result<Self, SidecarError> {
        if routes.is_empty() {
            return Err(SidecarError::NoViableRoute {
                token_in_denom: token_in.denom.clone(),
                token_out_denom: token_out_denom.to_string(),
            });
        }

        let total_in = token_in.amount;
        let total_out: Decimal = routes.iter().map(|entry| entry.out_amount).sum();

        let mut spot_price = Decimal::ZERO;
        let mut effective_fee = Decimal::ZERO;
        for entry in &routes {
            let fraction = entry.in_amount / total_in;
            let route_spot = match entry.route.spot_price(&token_in.denom).await {
                Ok(spot) => spot,
                Err(err) => {
                    warn!("spot price fallback for route [{}]: {err}", entry.route);
                    if entry.in_amount.is_zero() {
                        Decimal::ZERO
                    } else {
                        entry.out_amount / entry.in_amount
                    }
                }
            };
            spot_price += route_spot * fraction;
            effective_fee += entry.route.effective_fee() * fraction;
        }

        let execution_price = total_out / total_in;
        let price_impact = if spot_price.is_zero() {
            Decimal::ZERO
        } else {
            execution_price / spot_price - Decimal::ONE
        };

        Ok(Self {
            amount_in: token_in,
            amount_out: Coin::new(token_out_denom, total_out),
            routes,
            effective_fee,
            price_impact,
            in_base_out_quote_spot_price: spot_price,
        })
    }
}
