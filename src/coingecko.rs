// src/coingecko.rs

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::Decimal;
use url::Url;

use crate::cache::Cache;
use crate::errors::SidecarError;
use crate::pricing::{format_pricing_cache_key, PricingOptions, PricingSource, PricingSourceType};
use crate::settings::PricingConfig;

// CoinGecko returns {"<id>": {"<vs_currency>": <price>}} from simple/price.
type CoinGeckoPriceResponse = HashMap<String, HashMap<String, Decimal>>;

const HTTP_TIMEOUT: Duration = Duration::from_millis(2500);
const PRICE_CACHE_MAX_ENTRIES: usize = 10_000;

/// Price source backed by the CoinGecko HTTP API.
///
/// Denoms are translated to CoinGecko ids through a static map; a pair price
/// is derived as the ratio of the two assets' prices in the configured
/// vs-currency, so stablecoin quotes come out near 1. Responses are cached
/// with the same TTL and key scheme as chain prices.
pub struct CoinGeckoPricingSource {
    client: reqwest::Client,
    base_url: Url,
    quote_currency: String,
    id_map: HashMap<String, String>,
    cache: Cache<Decimal>,
    cache_ttl: Duration,
}

impl CoinGeckoPricingSource {
    pub fn new(config: &PricingConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.coingecko_url)
            .with_context(|| format!("invalid CoinGecko url {:?}", config.coingecko_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("CoinGecko url {base_url} cannot be a base");
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build CoinGecko HTTP client")?;

        Ok(Self {
            client,
            base_url,
            quote_currency: config.coingecko_quote_currency.clone(),
            id_map: default_id_map(),
            cache: Cache::new("coingecko_price", PRICE_CACHE_MAX_ENTRIES),
            cache_ttl: Duration::from_millis(config.cache_expiry_ms),
        })
    }

    /// Replaces the denom-to-id map, for chains beyond the built-in set.
    pub fn with_id_map(mut self, id_map: HashMap<String, String>) -> Self {
        self.id_map = id_map;
        self
    }

    fn id_for(&self, denom: &str) -> Option<&str> {
        self.id_map.get(denom).map(String::as_str)
    }

    fn price_request_url(&self, ids: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("CoinGecko url {} cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(["simple", "price"]);
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", &self.quote_currency);
        Ok(url)
    }

    /// Fetches the vs-currency price for each id, dropping ids CoinGecko
    /// does not answer for.
    async fn fetch_quotes(&self, ids: &[&str]) -> anyhow::Result<HashMap<String, Decimal>> {
        let url = self.price_request_url(ids)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("CoinGecko request to {url} failed"))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            anyhow::bail!("CoinGecko rate limited (429)");
        }
        if !response.status().is_success() {
            anyhow::bail!("CoinGecko HTTP error: {}", response.status());
        }

        let payload: CoinGeckoPriceResponse = response
            .json()
            .await
            .context("CoinGecko response parse failed")?;

        Ok(payload
            .into_iter()
            .filter_map(|(id, by_currency)| {
                by_currency
                    .get(&self.quote_currency)
                    .copied()
                    .map(|price| (id, price))
            })
            .collect())
    }
}

#[async_trait]
impl PricingSource for CoinGeckoPricingSource {
    async fn get_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
        options: PricingOptions,
    ) -> Result<Decimal, SidecarError> {
        let cache_key = format_pricing_cache_key(base_denom, quote_denom);
        if !options.recompute_prices {
            if let Some(price) = self.cache.get(&cache_key) {
                debug!("✅ CoinGecko cache hit {base_denom}/{quote_denom}: {price}");
                return Ok(price);
            }
        }

        let unavailable = || SidecarError::PriceUnavailable {
            base_denom: base_denom.to_string(),
            quote_denom: quote_denom.to_string(),
        };
        let base_id = self.id_for(base_denom).ok_or_else(unavailable)?;
        let quote_id = self.id_for(quote_denom).ok_or_else(unavailable)?;

        let mut ids = vec![base_id];
        if quote_id != base_id {
            ids.push(quote_id);
        }
        let quotes = self
            .fetch_quotes(&ids)
            .await
            .map_err(SidecarError::ExternalPriceSource)?;

        let base_price = quotes.get(base_id).copied().ok_or_else(unavailable)?;
        let quote_price = quotes.get(quote_id).copied().ok_or_else(unavailable)?;
        if quote_price.is_zero() {
            warn!("⚠️ CoinGecko returned a zero price for {quote_id}");
            return Err(SidecarError::ZeroPrice {
                denom: quote_denom.to_string(),
            });
        }

        let price = base_price / quote_price;
        self.cache.set(cache_key, price, Some(self.cache_ttl));
        debug!("✅ CoinGecko price {base_denom}/{quote_denom}: {price}");
        Ok(price)
    }

    fn source_type(&self) -> PricingSourceType {
        PricingSourceType::CoinGecko
    }
}

/// Osmosis mainnet denoms for the assets CoinGecko tracks.
fn default_id_map() -> HashMap<String, String> {
    let mut id_map = HashMap::new();

    id_map.insert("uosmo".to_string(), "osmosis".to_string());
    id_map.insert("uion".to_string(), "ion".to_string());
    id_map.insert(
        // ATOM via channel-0
        "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2".to_string(),
        "cosmos".to_string(),
    );
    id_map.insert(
        // USDC via Noble
        "ibc/498A0751C798A0D9A389AA3691123DADA57DAA4FE165D5C75894505B876BA6E4".to_string(),
        "usd-coin".to_string(),
    );
    id_map.insert(
        // TIA via Celestia
        "ibc/D79E7D83AB399BFFF93433E54FAA480C191248FC556924A2A8351AE2638B3877".to_string(),
        "celestia".to_string(),
    );

    id_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn unreachable_source() -> CoinGeckoPricingSource {
        let config = PricingConfig {
            coingecko_url: "http://127.0.0.1:9".to_string(),
            ..PricingConfig::default()
        };
        CoinGeckoPricingSource::new(&config).unwrap()
    }

    #[test]
    fn test_price_request_url_shape() {
        let source = CoinGeckoPricingSource::new(&PricingConfig::default()).unwrap();
        let url = source.price_request_url(&["cosmos", "usd-coin"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=cosmos%2Cusd-coin&vs_currencies=usd"
        );
    }

    #[test]
    fn test_default_id_map_covers_native_denoms() {
        let source = CoinGeckoPricingSource::new(&PricingConfig::default()).unwrap();
        assert_eq!(source.id_for("uosmo"), Some("osmosis"));
        assert_eq!(source.id_for("unknown"), None);
        assert_eq!(source.source_type(), PricingSourceType::CoinGecko);
    }

    #[tokio::test]
    async fn test_unmapped_denom_is_unavailable_before_any_request() {
        let source = unreachable_source();
        let err = source
            .get_price("unmapped", "uosmo", PricingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::PriceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cached_price_is_served_for_either_denom_order() {
        let source = unreachable_source();
        source.cache.set(
            format_pricing_cache_key("uatom", "usdc"),
            dec!(4.5),
            None,
        );

        let price = source
            .get_price("uatom", "usdc", PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(price, dec!(4.5));

        let reversed = source
            .get_price("usdc", "uatom", PricingOptions::default())
            .await
            .unwrap();
        assert_eq!(reversed, dec!(4.5));
    }

    #[tokio::test]
    async fn test_recompute_bypasses_cache_and_surfaces_transport_errors() {
        let source = unreachable_source();
        source.cache.set(
            format_pricing_cache_key("uosmo", "uion"),
            dec!(2),
            None,
        );

        let err = source
            .get_price(
                "uosmo",
                "uion",
                PricingOptions::default().with_recompute_prices(),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, SidecarError::ExternalPriceSource(_)),
            "unexpected error: {err}"
        );
    }
}
