// src/pools.rs

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract_client::{
    query_contract, CalcOutAmtGivenInRequest, CalcOutAmtGivenInResponse, ContractQueryClient,
    SpotPrice, SpotPriceQueryMsg, SpotPriceQueryMsgResponse,
};
use crate::errors::SidecarError;

/// A token amount paired with its denom, the unit all pool and route
/// computations work in. Amounts serialize as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Decimal,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Pool variant tag.
///
/// Stableswap and concentrated-liquidity math live in external libraries and
/// plug in through the same [`RoutablePool`] trait; this crate ships local
/// math for weighted pools and chain-backed math for CosmWasm pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    /// Constant-product pool with equal weights
    Weighted,
    /// StableSwap pool for pegged assets
    Stableswap,
    /// Concentrated liquidity pool
    Concentrated,
    /// Generalized CosmWasm pool (e.g. transmuter)
    CosmWasm,
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::Weighted => write!(f, "Weighted"),
            PoolType::Stableswap => write!(f, "Stableswap"),
            PoolType::Concentrated => write!(f, "Concentrated"),
            PoolType::CosmWasm => write!(f, "Generalized CosmWasm"),
        }
    }
}

/// Polymorphic view over heterogeneous AMM pool implementations.
///
/// The router and pricing layers treat every pool as a black box behind this
/// trait: output simulation and spot pricing may be computed locally
/// ([`WeightedPool`]) or round-trip to the chain ([`CosmWasmPool`]), so both
/// entry points are async and callers bound them with deadlines.
///
/// Pools are immutable within a snapshot; a new snapshot replaces them
/// wholesale between heights.
#[async_trait]
pub trait RoutablePool: Send + Sync + fmt::Debug {
    fn id(&self) -> u64;

    fn pool_type(&self) -> PoolType;

    fn denoms(&self) -> Vec<String>;

    fn balances(&self) -> &[Coin];

    fn taker_fee(&self) -> Decimal;

    fn spread_factor(&self) -> Decimal;

    /// Pool liquidity normalized into the quote denom, as supplied by the
    /// ingestion pipeline. Used for pre-sorting and min-liquidity filtering.
    fn liquidity(&self) -> Decimal;

    /// Simulates swapping `token_in` for `token_out_denom`.
    ///
    /// The taker fee must already be charged by the caller (see
    /// [`RoutablePool::charge_taker_fee_exact_in`]); the spread factor is
    /// applied inside the pool math.
    async fn calculate_token_out(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
    ) -> Result<Coin, SidecarError>;

    /// Price of one unit of `base_denom` in terms of `quote_denom` at zero
    /// trade size.
    async fn spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<Decimal, SidecarError>;

    /// Charges the pool's taker fee on an exact-in amount, returning the
    /// amount that actually enters the swap.
    fn charge_taker_fee_exact_in(&self, token_in: &Coin) -> Coin {
        let amount_after_fee = token_in.amount * (Decimal::ONE - self.taker_fee());
        Coin::new(token_in.denom.clone(), amount_after_fee)
    }

    fn is_generalized_cosmwasm_pool(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!(
            "pool ({}), pool type ({}), pool denoms ({:?})",
            self.id(),
            self.pool_type(),
            self.denoms()
        )
    }
}

/// Constant-product pool over two or more denoms with equal weights.
///
/// Output amounts follow the x * y = k formula with the spread factor applied
/// to the input; reserves never fully drain because the formula asymptotes.
#[derive(Debug, Clone)]
pub struct WeightedPool {
    id: u64,
    balances: Vec<Coin>,
    spread_factor: Decimal,
    taker_fee: Decimal,
    liquidity: Decimal,
}

impl WeightedPool {
    pub fn new(
        id: u64,
        balances: Vec<Coin>,
        spread_factor: Decimal,
        taker_fee: Decimal,
        liquidity: Decimal,
    ) -> Self {
        Self {
            id,
            balances,
            spread_factor,
            taker_fee,
            liquidity,
        }
    }

    fn balance_of(&self, denom: &str) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|coin| coin.denom == denom)
            .map(|coin| coin.amount)
    }
}

#[async_trait]
impl RoutablePool for WeightedPool {
    fn id(&self) -> u64 {
        self.id
    }

    fn pool_type(&self) -> PoolType {
        PoolType::Weighted
    }

    fn denoms(&self) -> Vec<String> {
        self.balances.iter().map(|coin| coin.denom.clone()).collect()
    }

    fn balances(&self) -> &[Coin] {
        &self.balances
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn spread_factor(&self) -> Decimal {
        self.spread_factor
    }

    fn liquidity(&self) -> Decimal {
        self.liquidity
    }

    async fn calculate_token_out(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
    ) -> Result<Coin, SidecarError> {
        let reserve_in =
            self.balance_of(&token_in.denom)
                .ok_or_else(|| SidecarError::DenomNotInPool {
                    pool_id: self.id,
                    denom: token_in.denom.clone(),
                })?;
        let reserve_out =
            self.balance_of(token_out_denom)
                .ok_or_else(|| SidecarError::DenomNotInPool {
                    pool_id: self.id,
                    denom: token_out_denom.to_string(),
                })?;

        if reserve_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
            return Err(SidecarError::InsufficientLiquidity { pool_id: self.id });
        }

        let amount_in_after_spread = token_in.amount * (Decimal::ONE - self.spread_factor);
        if amount_in_after_spread <= Decimal::ZERO {
            return Ok(Coin::new(token_out_denom, Decimal::ZERO));
        }

        let amount_out =
            reserve_out * amount_in_after_spread / (reserve_in + amount_in_after_spread);

        // The formula asymptotes below reserve_out; equality means corrupted reserves.
        if amount_out >= reserve_out {
            return Err(SidecarError::InsufficientLiquidity { pool_id: self.id });
        }

        Ok(Coin::new(token_out_denom, amount_out))
    }

    async fn spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<Decimal, SidecarError> {
        let reserve_base =
            self.balance_of(base_denom)
                .ok_or_else(|| SidecarError::DenomNotInPool {
                    pool_id: self.id,
                    denom: base_denom.to_string(),
                })?;
        let reserve_quote =
            self.balance_of(quote_denom)
                .ok_or_else(|| SidecarError::DenomNotInPool {
                    pool_id: self.id,
                    denom: quote_denom.to_string(),
                })?;

        if reserve_base <= Decimal::ZERO {
            return Err(SidecarError::InsufficientLiquidity { pool_id: self.id });
        }

        Ok(reserve_quote / reserve_base)
    }
}

/// CosmWasm contract info per the cw2 spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract: String,
    pub version: String,
}

impl ContractInfo {
    /// Check if the contract info matches the given contract and version.
    /// The version is matched exactly.
    // TODO: support semver range matching
    pub fn matches(&self, contract: &str, version: &str) -> bool {
        self.contract == contract && self.version == version
    }
}

/// Pool-level model for generalized CosmWasm pools, carried from ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwPoolModel {
    pub contract_info: ContractInfo,
    pub data: CwPoolData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CwPoolData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmuter_alloyed: Option<TransmuterAlloyedData>,
}

/// Alloyed transmuter data, since transmuter v3.
/// `asset_configs` lists denom and normalization factor pairs including the
/// alloyed denom itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmuterAlloyedData {
    pub alloyed_denom: String,
    pub asset_configs: Vec<TransmuterAssetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmuterAssetConfig {
    pub denom: String,
    pub normalization_factor: Decimal,
}

impl CwPoolModel {
    pub fn new(contract: impl Into<String>, version: impl Into<String>, data: CwPoolData) -> Self {
        Self {
            contract_info: ContractInfo {
                contract: contract.into(),
                version: version.into(),
            },
            data,
        }
    }

    pub fn is_alloy_transmuter(&self) -> bool {
        self.data.transmuter_alloyed.is_some()
    }
}

/// Generalized CosmWasm pool whose swap math lives in the contract.
///
/// Quotes and spot prices round-trip through the injected query client.
/// Transmuter contracts answer with no-slippage amounts, so as long as the
/// pool holds enough of the out denom the returned amount equals the input.
#[derive(Clone)]
pub struct CosmWasmPool {
    id: u64,
    pool_type: PoolType,
    contract_address: String,
    model: CwPoolModel,
    balances: Vec<Coin>,
    taker_fee: Decimal,
    spread_factor: Decimal,
    liquidity: Decimal,
    client: Arc<dyn ContractQueryClient>,
}

impl CosmWasmPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        pool_type: PoolType,
        contract_address: impl Into<String>,
        model: CwPoolModel,
        balances: Vec<Coin>,
        taker_fee: Decimal,
        spread_factor: Decimal,
        liquidity: Decimal,
        client: Arc<dyn ContractQueryClient>,
    ) -> Self {
        Self {
            id,
            pool_type,
            contract_address: contract_address.into(),
            model,
            balances,
            taker_fee,
            spread_factor,
            liquidity,
            client,
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn model(&self) -> &CwPoolModel {
        &self.model
    }
}

impl fmt::Debug for CosmWasmPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmWasmPool")
            .field("id", &self.id)
            .field("contract_address", &self.contract_address)
            .field("contract_info", &self.model.contract_info)
            .field("balances", &self.balances)
            .finish()
    }
}

#[async_trait]
impl RoutablePool for CosmWasmPool {
    fn id(&self) -> u64 {
        self.id
    }

    fn pool_type(&self) -> PoolType {
        self.pool_type
    }

    fn denoms(&self) -> Vec<String> {
        self.balances.iter().map(|coin| coin.denom.clone()).collect()
    }

    fn balances(&self) -> &[Coin] {
        &self.balances
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn spread_factor(&self) -> Decimal {
        self.spread_factor
    }

    fn liquidity(&self) -> Decimal {
        self.liquidity
    }

    async fn calculate_token_out(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
    ) -> Result<Coin, SidecarError> {
        // Guards against ingestion handing a non-CosmWasm pool to this impl.
        if self.pool_type != PoolType::CosmWasm {
            return Err(SidecarError::InvalidPoolType {
                pool_id: self.id,
                pool_type: self.pool_type,
            });
        }

        let request = CalcOutAmtGivenInRequest::new(
            token_in.clone(),
            token_out_denom.to_string(),
            self.spread_factor,
        );

        let response: CalcOutAmtGivenInResponse =
            query_contract(self.client.as_ref(), &self.contract_address, &request).await?;

        Ok(response.token_out)
    }

    async fn spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<Decimal, SidecarError> {
        let request = SpotPriceQueryMsg {
            spot_price: SpotPrice {
                quote_asset_denom: quote_denom.to_string(),
                base_asset_denom: base_denom.to_string(),
            },
        };

        let response: SpotPriceQueryMsgResponse =
            query_contract(self.client.as_ref(), &self.contract_address, &request).await?;

        response
            .spot_price
            .parse::<Decimal>()
            .map_err(|e| SidecarError::ContractQuery(anyhow::anyhow!(
                "contract {} returned unparseable spot price {:?}: {e}",
                self.contract_address,
                response.spot_price
            )))
    }

    fn is_generalized_cosmwasm_pool(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!(
            "pool ({}), pool type ({}), pool denoms ({:?}), contract ({})",
            self.id,
            self.pool_type,
            self.denoms(),
            self.contract_address
        )
    }
}

/// Set of pools and denoms touched at a given height, the unit of incremental
/// work handed to the pricing worker.
#[derive(Debug, Clone, Default)]
pub struct BlockPoolMetadata {
    pub height: u64,
    pub pool_ids: IndexSet<u64>,
    pub updated_denoms: IndexSet<String>,
}

impl BlockPoolMetadata {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }
}

/// Immutable per-height view of all routable pools, pre-sorted for discovery.
///
/// Preferred pools come first (in their configured order), the remainder in
/// descending liquidity order; the denom index references positions in that
/// order so discovery expands higher-liquidity pools before lower ones.
/// Replaced wholesale between heights via atomic publication, so readers see
/// either the old or the new snapshot in full.
#[derive(Debug)]
pub struct PoolSnapshot {
    pools: Vec<Arc<dyn RoutablePool>>,
    by_denom: HashMap<String, Vec<usize>>,
    by_id: HashMap<u64, usize>,
    height: u64,
}

impl PoolSnapshot {
    pub fn new(
        mut pools: Vec<Arc<dyn RoutablePool>>,
        preferred_pool_ids: &[u64],
        height: u64,
    ) -> Self {
        let preferred_rank =
            |id: u64| preferred_pool_ids.iter().position(|preferred| *preferred == id);

        pools.sort_by(|a, b| match (preferred_rank(a.id()), preferred_rank(b.id())) {
            (Some(ra), Some(rb)) => ra.cmp(&rb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.liquidity().cmp(&a.liquidity()),
        });

        let mut by_denom: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_id = HashMap::with_capacity(pools.len());
        for (position, pool) in pools.iter().enumerate() {
            by_id.insert(pool.id(), position);
            for denom in pool.denoms() {
                by_denom.entry(denom).or_default().push(position);
            }
        }

        Self {
            pools,
            by_denom,
            by_id,
            height,
        }
    }

    /// Snapshot with no pools at height 0, the state before the first
    /// ingestion push.
    pub fn empty() -> Self {
        Self {
            pools: Vec::new(),
            by_denom: HashMap::new(),
            by_id: HashMap::new(),
            height: 0,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn pools(&self) -> &[Arc<dyn RoutablePool>] {
        &self.pools
    }

    pub fn pool_by_id(&self, id: u64) -> Option<&Arc<dyn RoutablePool>> {
        self.by_id.get(&id).map(|position| &self.pools[*position])
    }

    /// Pools holding `denom`, in snapshot (preferred-then-liquidity) order.
    pub fn pools_with_denom<'a>(
        &'a self,
        denom: &str,
    ) -> impl Iterator<Item = &'a Arc<dyn RoutablePool>> + 'a {
        self.by_denom
            .get(denom)
            .into_iter()
            .flatten()
            .map(move |position| &self.pools[*position])
    }

    pub fn num_pools(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_client::MockContractQueryClient;
    use rust_decimal_macros::dec;

    fn weighted(id: u64, denom_a: &str, amount_a: Decimal, denom_b: &str, amount_b: Decimal) -> WeightedPool {
        WeightedPool::new(
            id,
            vec![Coin::new(denom_a, amount_a), Coin::new(denom_b, amount_b)],
            dec!(0.002),
            dec!(0.001),
            amount_a + amount_b,
        )
    }

    #[tokio::test]
    async fn test_weighted_pool_token_out() {
        let pool = weighted(1, "uatom", dec!(1000), "uosmo", dec!(4000));

        let out = pool
            .calculate_token_out(&Coin::new("uatom", dec!(100)), "uosmo")
            .await
            .unwrap();

        assert_eq!(out.denom, "uosmo");
        // 99.8 in after spread -> 4000 * 99.8 / 1099.8
        let expected = dec!(4000) * dec!(99.8) / dec!(1099.8);
        assert_eq!(out.amount, expected);
        assert!(out.amount < dec!(4000), "output must stay below reserves");
    }

    #[tokio::test]
    async fn test_weighted_pool_unknown_denom_errors() {
        let pool = weighted(7, "uatom", dec!(1000), "uosmo", dec!(4000));

        let err = pool
            .calculate_token_out(&Coin::new("ujuno", dec!(10)), "uosmo")
            .await
            .unwrap_err();

        assert!(
            matches!(err, SidecarError::DenomNotInPool { pool_id: 7, ref denom } if denom == "ujuno"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_weighted_pool_spot_price_is_reserve_ratio() {
        let pool = weighted(2, "uatom", dec!(1000), "uosmo", dec!(4000));

        let price = pool.spot_price("uatom", "uosmo").await.unwrap();
        assert_eq!(price, dec!(4));

        let inverse = pool.spot_price("uosmo", "uatom").await.unwrap();
        assert_eq!(inverse, dec!(0.25));
    }

    #[test]
    fn test_charge_taker_fee_exact_in() {
        let pool = weighted(3, "uatom", dec!(1000), "uosmo", dec!(4000));

        let after = pool.charge_taker_fee_exact_in(&Coin::new("uatom", dec!(1000)));
        assert_eq!(after.amount, dec!(999));
        assert_eq!(after.denom, "uatom");
    }

    #[tokio::test]
    async fn test_cosmwasm_pool_transmuter_no_slippage() {
        let client = Arc::new(MockContractQueryClient::new());
        let pool = CosmWasmPool::new(
            83,
            PoolType::CosmWasm,
            "osmo1transmuter",
            CwPoolModel::new("crates.io:transmuter", "3.0.0", CwPoolData::default()),
            vec![
                Coin::new("usdc.axl", dec!(500000)),
                Coin::new("usdc.noble", dec!(500000)),
            ],
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1000000),
            client,
        );

        let out = pool
            .calculate_token_out(&Coin::new("usdc.axl", dec!(2500)), "usdc.noble")
            .await
            .unwrap();

        assert_eq!(out.amount, dec!(2500), "transmuter swaps have no slippage");
        assert_eq!(out.denom, "usdc.noble");
        assert!(pool.is_generalized_cosmwasm_pool());
    }

    #[tokio::test]
    async fn test_cosmwasm_pool_rejects_wrong_pool_type() {
        let client = Arc::new(MockContractQueryClient::new());
        let pool = CosmWasmPool::new(
            84,
            PoolType::Weighted,
            "osmo1notcw",
            CwPoolModel::new("crates.io:transmuter", "3.0.0", CwPoolData::default()),
            vec![Coin::new("uatom", dec!(1))],
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1),
            client,
        );

        let err = pool
            .calculate_token_out(&Coin::new("uatom", dec!(1)), "uosmo")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SidecarError::InvalidPoolType {
                pool_id: 84,
                pool_type: PoolType::Weighted
            }
        ));
    }

    #[test]
    fn test_contract_info_matches_exact_version() {
        let info = ContractInfo {
            contract: "crates.io:transmuter".to_string(),
            version: "3.0.0".to_string(),
        };

        assert!(info.matches("crates.io:transmuter", "3.0.0"));
        assert!(!info.matches("crates.io:transmuter", "2.0.0"));
        assert!(!info.matches("crates.io:orderbook", "3.0.0"));
    }

    #[test]
    fn test_snapshot_orders_preferred_then_liquidity() {
        let pools: Vec<Arc<dyn RoutablePool>> = vec![
            Arc::new(weighted(1, "a", dec!(10), "b", dec!(10))),
            Arc::new(weighted(2, "a", dec!(5000), "b", dec!(5000))),
            Arc::new(weighted(3, "a", dec!(100), "b", dec!(100))),
        ];

        let snapshot = PoolSnapshot::new(pools, &[3], 42);

        let order: Vec<u64> = snapshot.pools().iter().map(|p| p.id()).collect();
        assert_eq!(order, vec![3, 2, 1], "preferred pool first, then TVL descending");
        assert_eq!(snapshot.height(), 42);
        assert!(snapshot.pool_by_id(2).is_some());
        assert!(snapshot.pool_by_id(99).is_none());
    }

    #[test]
    fn test_snapshot_denom_index_follows_sort_order() {
        let pools: Vec<Arc<dyn RoutablePool>> = vec![
            Arc::new(weighted(10, "uatom", dec!(10), "uosmo", dec!(10))),
            Arc::new(weighted(11, "uatom", dec!(9000), "uosmo", dec!(9000))),
            Arc::new(weighted(12, "ujuno", dec!(50), "uosmo", dec!(50))),
        ];

        let snapshot = PoolSnapshot::new(pools, &[], 7);

        let atom_pools: Vec<u64> = snapshot.pools_with_denom("uatom").map(|p| p.id()).collect();
        assert_eq!(atom_pools, vec![11, 10]);

        assert_eq!(snapshot.pools_with_denom("unknown").count(), 0);
    }
}
