// Transactional repository over Redis - taker fees and candidate route cache
// Writes are staged on a single-use Tx and land atomically on exec

use crate::errors::SidecarError;
use crate::router::route::CandidateRoutes;
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const KEY_SEPARATOR: &str = "~";
// Prefixes nest under the router namespace: "r~", "r~tf~", "r~r~".
const TAKER_FEE_PREFIX: &str = "r~tf~";
const ROUTES_PREFIX: &str = "r~r~";

/// Taker fees keyed by canonical (denom0, denom1) pair, denom0 < denom1.
pub type TakerFeeMap = HashMap<(String, String), Decimal>;

/// Route-cache payload stored under `r~r~<token_in>~<token_out>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRoutes {
    pub routes: CandidateRoutes,
    pub cached_at: DateTime<Utc>,
}

/// Formats the canonical hash field for a denom pair, smaller denom first.
pub fn format_denom_pair_key(denom0: &str, denom1: &str) -> String {
    if denom0 < denom1 {
        format!("{denom0}{KEY_SEPARATOR}{denom1}")
    } else {
        format!("{denom1}{KEY_SEPARATOR}{denom0}")
    }
}

/// Splits a stored denom pair field back into its denoms, rejecting
/// malformed fields rather than repairing them.
pub fn parse_denom_pair_key(key: &str) -> Result<(String, String), SidecarError> {
    let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(SidecarError::InvalidDenomPairKeyComponents {
            key: key.to_string(),
            count: parts.len(),
        });
    }
    if parts[0] > parts[1] {
        return Err(SidecarError::InvalidDenomPairKeyOrder {
            key: key.to_string(),
        });
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

fn format_routes_key(token_in_denom: &str, token_out_denom: &str) -> String {
    format!("{ROUTES_PREFIX}{token_in_denom}{KEY_SEPARATOR}{token_out_denom}")
}

/// A single-use atomic transaction. Commands are staged locally and only
/// hit the store on `exec`; afterwards the transaction is spent, whether
/// execution succeeded or not.
pub struct Tx {
    pipeline: Option<redis::Pipeline>,
}

impl Tx {
    pub fn new() -> Self {
        let mut pipeline = redis::pipe();
        // MULTI/EXEC so staged commands land atomically
        pipeline.atomic();
        Self {
            pipeline: Some(pipeline),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pipeline.is_some()
    }

    fn pipeline_mut(&mut self) -> Result<&mut redis::Pipeline, SidecarError> {
        self.pipeline.as_mut().ok_or(SidecarError::TxNotInProgress)
    }

    fn take_pipeline(&mut self) -> Result<redis::Pipeline, SidecarError> {
        self.pipeline.take().ok_or(SidecarError::TxNotInProgress)
    }
}

impl Default for Tx {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out transactions and executes them against the shared connection.
#[derive(Clone)]
pub struct TxManager {
    conn: ConnectionManager,
}

impl TxManager {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub fn start_tx(&self) -> Tx {
        Tx::new()
    }

    /// Executes a write-only transaction. The transaction is spent on return.
    pub async fn exec(&self, tx: &mut Tx) -> Result<(), SidecarError> {
        self.query::<()>(tx).await
    }

    /// Executes a transaction and decodes the per-command results. Reads go
    /// through here so they share the single-use semantics of writes.
    pub async fn query<T: redis::FromRedisValue>(&self, tx: &mut Tx) -> Result<T, SidecarError> {
        let pipeline = tx.take_pipeline()?;
        let mut conn = self.conn.clone();
        Ok(pipeline.query_async(&mut conn).await?)
    }
}

/// Persistence for router state shared with the ingest side: taker fees per
/// denom pair and cached candidate routes per directional pair.
pub struct RouterRepository {
    tx_manager: TxManager,
}

impl RouterRepository {
    pub fn new(tx_manager: TxManager) -> Self {
        Self { tx_manager }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, SidecarError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("✅ Router repository connected to {redis_url}");
        Ok(Self::new(TxManager::new(conn)))
    }

    pub fn start_tx(&self) -> Tx {
        self.tx_manager.start_tx()
    }

    pub async fn exec_tx(&self, tx: &mut Tx) -> Result<(), SidecarError> {
        self.tx_manager.exec(tx).await
    }

    /// Stages a taker fee write on the caller's transaction. The pair is
    /// canonicalized, so both denom orders land on the same field.
    pub fn set_taker_fee(
        &self,
        tx: &mut Tx,
        denom0: &str,
        denom1: &str,
        taker_fee: Decimal,
    ) -> Result<(), SidecarError> {
        let field = format_denom_pair_key(denom0, denom1);
        tx.pipeline_mut()?
            .hset(TAKER_FEE_PREFIX, field, taker_fee.to_string())
            .ignore();
        Ok(())
    }

    pub async fn get_taker_fee(
        &self,
        denom0: &str,
        denom1: &str,
    ) -> Result<Option<Decimal>, SidecarError> {
        let field = format_denom_pair_key(denom0, denom1);
        let mut tx = self.start_tx();
        tx.pipeline_mut()?.hget(TAKER_FEE_PREFIX, &field);
        let (raw,): (Option<String>,) = self.tx_manager.query(&mut tx).await?;
        match raw {
            Some(raw) => {
                let fee = raw
                    .parse::<Decimal>()
                    .map_err(|_| SidecarError::InvalidTakerFeeValue {
                        key: field,
                        value: raw.clone(),
                    })?;
                Ok(Some(fee))
            }
            None => Ok(None),
        }
    }

    /// Reads the full taker fee hash. A field with the wrong number of
    /// components or out-of-order denoms is corrupt data and fails the read.
    pub async fn get_all_taker_fees(&self) -> Result<TakerFeeMap, SidecarError> {
        let mut tx = self.start_tx();
        tx.pipeline_mut()?.hgetall(TAKER_FEE_PREFIX);
        let (raw,): (HashMap<String, String>,) = self.tx_manager.query(&mut tx).await?;

        let mut fees = TakerFeeMap::with_capacity(raw.len());
        for (pair_key, fee_str) in raw {
            let (denom0, denom1) = parse_denom_pair_key(&pair_key)?;
            let fee = fee_str
                .parse::<Decimal>()
                .map_err(|_| SidecarError::InvalidTakerFeeValue {
                    key: pair_key.clone(),
                    value: fee_str.clone(),
                })?;
            fees.insert((denom0, denom1), fee);
        }
        Ok(fees)
    }

    /// Stages a candidate-route write under the directional pair key.
    /// `expiry_secs` of zero stores without a TTL.
    pub fn set_routes(
        &self,
        tx: &mut Tx,
        token_in_denom: &str,
        token_out_denom: &str,
        routes: &CandidateRoutes,
        expiry_secs: u64,
    ) -> Result<(), SidecarError> {
        let payload = CachedRoutes {
            routes: routes.clone(),
            cached_at: Utc::now(),
        };
        let bytes = bincode::serialize(&payload)?;
        let key = format_routes_key(token_in_denom, token_out_denom);
        let pipeline = tx.pipeline_mut()?;
        if expiry_secs > 0 {
            pipeline
                .cmd("SET")
                .arg(&key)
                .arg(bytes)
                .arg("EX")
                .arg(expiry_secs)
                .ignore();
        } else {
            pipeline.cmd("SET").arg(&key).arg(bytes).ignore();
        }
        Ok(())
    }

    pub async fn get_routes(
        &self,
        token_in_denom: &str,
        token_out_denom: &str,
    ) -> Result<Option<CachedRoutes>, SidecarError> {
        let key = format_routes_key(token_in_denom, token_out_denom);
        let mut tx = self.start_tx();
        tx.pipeline_mut()?.get(&key);
        let (bytes,): (Option<Vec<u8>>,) = self.tx_manager.query(&mut tx).await?;
        match bytes {
            Some(bytes) => {
                debug!("🗺️  Route cache hit for {token_in_denom}/{token_out_denom}");
                Ok(Some(bincode::deserialize(&bytes)?))
            }
            None => {
                debug!("❌ Route cache miss for {token_in_denom}/{token_out_denom}");
                Ok(None)
            }
        }
    }

    /// Wipes the entire store. Administrative use only.
    pub async fn clear_all(&self) -> Result<(), SidecarError> {
        let mut tx = self.start_tx();
        tx.pipeline_mut()?.cmd("FLUSHALL").ignore();
        self.exec_tx(&mut tx).await?;
        info!("🗑️  Cleared all router repository state");
        Ok(())
    }

    /// PING round-trip for readiness probes.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let mut conn = self.tx_manager.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        if pong == "PONG" {
            Ok(())
        } else {
            anyhow::bail!("Unexpected Redis response: {pong}")
        }
    }
}
