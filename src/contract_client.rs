// src/contract_client.rs

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::SidecarError;
use crate::pools::Coin;

/// Smart-query access to CosmWasm contracts.
///
/// Implementations wrap the node's wasm query endpoint; the injected client is
/// the only chain dependency of [`crate::pools::CosmWasmPool`]. Cancellation
/// is driven by the caller's deadline on the future.
#[async_trait]
pub trait ContractQueryClient: Send + Sync {
    async fn query_smart(
        &self,
        contract_address: &str,
        msg: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value>;
}

/// Serializes `request`, runs the smart query, and deserializes the response.
pub async fn query_contract<Req, Resp>(
    client: &dyn ContractQueryClient,
    contract_address: &str,
    request: &Req,
) -> Result<Resp, SidecarError>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let msg = serde_json::to_value(request)
        .map_err(|e| SidecarError::ContractQuery(anyhow::Error::new(e)))?;

    let raw = client
        .query_smart(contract_address, msg)
        .await
        .map_err(SidecarError::ContractQuery)?;

    serde_json::from_value(raw).map_err(|e| SidecarError::ContractQuery(anyhow::Error::new(e)))
}

/// Inner body of the calc-out-amt-given-in query. The spread factor travels
/// as `swap_fee`, matching the contract interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcOutAmtGivenIn {
    pub token_in: Coin,
    pub token_out_denom: String,
    pub swap_fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcOutAmtGivenInRequest {
    pub calc_out_amt_given_in: CalcOutAmtGivenIn,
}

impl CalcOutAmtGivenInRequest {
    pub fn new(token_in: Coin, token_out_denom: String, swap_fee: Decimal) -> Self {
        Self {
            calc_out_amt_given_in: CalcOutAmtGivenIn {
                token_in,
                token_out_denom,
                swap_fee,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcOutAmtGivenInResponse {
    pub token_out: Coin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPriceQueryMsg {
    pub spot_price: SpotPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPrice {
    pub quote_asset_denom: String,
    pub base_asset_denom: String,
}

/// Spot price comes back as a decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPriceQueryMsgResponse {
    pub spot_price: String,
}

/// In-memory client answering transmuter-style queries: swaps are 1:1 with no
/// slippage and spot prices default to one unless overridden per contract.
/// Backs unit tests and the demo programs.
#[derive(Debug, Default)]
pub struct MockContractQueryClient {
    spot_prices: DashMap<String, Decimal>,
}

impl MockContractQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spot_price(&self, contract_address: impl Into<String>, price: Decimal) {
        self.spot_prices.insert(contract_address.into(), price);
    }
}

#[async_trait]
impl ContractQueryClient for MockContractQueryClient {
    async fn query_smart(
        &self,
        contract_address: &str,
        msg: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        if let Ok(request) = serde_json::from_value::<CalcOutAmtGivenInRequest>(msg.clone()) {
            let body = request.calc_out_amt_given_in;
            let token_out = Coin::new(body.token_out_denom, body.token_in.amount);
            return Ok(serde_json::to_value(CalcOutAmtGivenInResponse { token_out })?);
        }

        if serde_json::from_value::<SpotPriceQueryMsg>(msg.clone()).is_ok() {
            let spot_price = self
                .spot_prices
                .get(contract_address)
                .map(|entry| *entry.value())
                .unwrap_or(Decimal::ONE);
            return Ok(serde_json::to_value(SpotPriceQueryMsgResponse {
                spot_price: spot_price.to_string(),
            })?);
        }

        anyhow::bail!("unsupported contract query for {contract_address}: {msg}")
    }
}
