// src/pricing.rs

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::SidecarError;
use crate::pools::Coin;

/// Mapping base-denom -> quote-denom -> price.
///
/// This shape is consumed over the wire by downstream services; changing it
/// is a compatibility break, not an internal refactor.
pub type PricesResult = HashMap<String, HashMap<String, Decimal>>;

/// Which backend computes prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PricingSourceType {
    /// On-chain pools via the router (spot or quote-based).
    #[default]
    #[serde(rename = "chain")]
    Chain,
    /// CoinGecko HTTP API.
    #[serde(rename = "coingecko")]
    CoinGecko,
}

impl fmt::Display for PricingSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingSourceType::Chain => write!(f, "chain"),
            PricingSourceType::CoinGecko => write!(f, "coingecko"),
        }
    }
}

/// Per-call pricing knobs.
///
/// Defaults read from the cache and, when a computation is needed, use the
/// spot-price method against the most liquid connecting pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingOptions {
    /// Skip the cache and recompute even on a hit.
    pub recompute_prices: bool,
    /// Selects the compute method: spot price when true, a simulated
    /// nominal swap (quote-based) when false.
    pub recompute_prices_is_spot_price_compute_method: bool,
    /// Pools below this liquidity are not considered. None disables the filter.
    pub min_liquidity: Option<Decimal>,
}

impl Default for PricingOptions {
    fn default() -> Self {
        Self {
            recompute_prices: false,
            recompute_prices_is_spot_price_compute_method: true,
            min_liquidity: None,
        }
    }
}

impl PricingOptions {
    pub fn with_recompute_prices(mut self) -> Self {
        self.recompute_prices = true;
        self
    }

    /// Recompute with the quote-based method instead of the spot method.
    pub fn with_recompute_prices_quote_based_method(mut self) -> Self {
        self.recompute_prices = true;
        self.recompute_prices_is_spot_price_compute_method = false;
        self
    }

    pub fn with_min_liquidity(mut self, min_liquidity: Decimal) -> Self {
        self.min_liquidity = Some(min_liquidity);
        self
    }
}

/// Price plus the scaling factor that converts raw on-chain amounts of the
/// base denom into human units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenomPriceInfo {
    pub price: Decimal,
    pub scaling_factor: Decimal,
}

/// Canonical price cache key for an unordered denom pair.
///
/// The lexicographically larger denom goes first so `(base, quote)` and
/// `(quote, base)` land on the same entry.
pub fn format_pricing_cache_key(denom_a: &str, denom_b: &str) -> String {
    if denom_a < denom_b {
        format!("{denom_b}{denom_a}")
    } else {
        format!("{denom_a}{denom_b}")
    }
}

/// A backend capable of answering price queries.
#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Price of one unit of `base_denom` denominated in `quote_denom`.
    async fn get_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
        options: PricingOptions,
    ) -> Result<Decimal, SidecarError>;

    fn source_type(&self) -> PricingSourceType;
}

/// Converts pool balances into capitalization in a common quote denom.
///
/// Used by the ingestion side to attach a liquidity figure to every pool so
/// the router can pre-sort and filter by it.
#[derive(Debug, Clone)]
pub struct LiquidityPricer {
    quote_denom: String,
}

impl LiquidityPricer {
    pub fn new(quote_denom: impl Into<String>) -> Self {
        Self {
            quote_denom: quote_denom.into(),
        }
    }

    pub fn quote_denom(&self) -> &str {
        &self.quote_denom
    }

    /// Capitalization of `coin` in the quote denom: amount * price / scaling.
    ///
    /// A non-zero amount whose capitalization truncates to zero is an
    /// error, not a zero result.
    pub fn compute_coin_cap(
        &self,
        coin: &Coin,
        price_info: &DenomPriceInfo,
    ) -> Result<Decimal, SidecarError> {
        if price_info.price.is_zero() {
            return Err(SidecarError::ZeroPrice {
                denom: coin.denom.clone(),
            });
        }
        if price_info.scaling_factor.is_zero() {
            return Err(SidecarError::ZeroScalingFactor {
                denom: coin.denom.clone(),
            });
        }

        let cap = coin.amount * price_info.price / price_info.scaling_factor;
        if cap.is_zero() && !coin.amount.is_zero() {
            return Err(SidecarError::TruncatedCoinCap {
                denom: coin.denom.clone(),
            });
        }

        Ok(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pricing_cache_key_puts_larger_denom_first() {
        assert_eq!(format_pricing_cache_key("uatom", "uosmo"), "uosmouatom");
        assert_eq!(format_pricing_cache_key("uosmo", "uatom"), "uosmouatom");
        assert_eq!(format_pricing_cache_key("uatom", "uatom"), "uatomuatom");
    }

    #[test]
    fn test_default_options_use_cached_spot_method() {
        let options = PricingOptions::default();
        assert!(!options.recompute_prices);
        assert!(options.recompute_prices_is_spot_price_compute_method);
        assert_eq!(options.min_liquidity, None);
    }

    #[test]
    fn test_quote_based_method_implies_recompute() {
        let options = PricingOptions::default().with_recompute_prices_quote_based_method();
        assert!(options.recompute_prices);
        assert!(!options.recompute_prices_is_spot_price_compute_method);

        let options = PricingOptions::default()
            .with_recompute_prices()
            .with_min_liquidity(dec!(50000));
        assert!(options.recompute_prices);
        assert!(options.recompute_prices_is_spot_price_compute_method);
        assert_eq!(options.min_liquidity, Some(dec!(50000)));
    }

    #[test]
    fn test_source_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&PricingSourceType::Chain).unwrap(),
            "\"chain\""
        );
        assert_eq!(
            serde_json::from_str::<PricingSourceType>("\"coingecko\"").unwrap(),
            PricingSourceType::CoinGecko
        );
        assert_eq!(PricingSourceType::default(), PricingSourceType::Chain);
        assert_eq!(PricingSourceType::CoinGecko.to_string(), "coingecko");
    }

    #[test]
    fn test_compute_coin_cap_scales_amount() {
        let pricer = LiquidityPricer::new("usdc");
        let info = DenomPriceInfo {
            price: dec!(4),
            scaling_factor: dec!(1000),
        };

        let cap = pricer
            .compute_coin_cap(&Coin::new("uatom", dec!(1000)), &info)
            .unwrap();
        assert_eq!(cap, dec!(4));
        assert_eq!(pricer.quote_denom(), "usdc");
    }

    #[test]
    fn test_compute_coin_cap_rejects_zero_price_and_scaling() {
        let pricer = LiquidityPricer::new("usdc");
        let coin = Coin::new("uatom", dec!(1000));

        let err = pricer
            .compute_coin_cap(
                &coin,
                &DenomPriceInfo {
                    price: Decimal::ZERO,
                    scaling_factor: dec!(1000),
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "price for uatom is zero");

        let err = pricer
            .compute_coin_cap(
                &coin,
                &DenomPriceInfo {
                    price: dec!(4),
                    scaling_factor: Decimal::ZERO,
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "scaling factor for uatom is zero");
    }

    #[test]
    fn test_compute_coin_cap_reports_truncation() {
        let pricer = LiquidityPricer::new("usdc");
        // 1 * 1e-20 / 1e10 needs 30 fractional digits and truncates to zero.
        let info = DenomPriceInfo {
            price: dec!(0.00000000000000000001),
            scaling_factor: dec!(10000000000),
        };

        let err = pricer
            .compute_coin_cap(&Coin::new("dust", dec!(1)), &info)
            .unwrap_err();
        assert_eq!(err.to_string(), "truncated capitalization for (dust)");

        // A zero amount is legitimately zero, not truncation.
        let cap = pricer
            .compute_coin_cap(&Coin::new("dust", Decimal::ZERO), &info)
            .unwrap();
        assert_eq!(cap, Decimal::ZERO);
    }
}
