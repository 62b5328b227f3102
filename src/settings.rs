use crate::pricing::PricingSourceType;
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_max_pools_per_route")]
    pub max_pools_per_route: usize,
    #[serde(default = "default_max_routes")]
    pub max_routes: usize,
    #[serde(default = "default_max_split_routes")]
    pub max_split_routes: usize,
    #[serde(default = "default_max_split_iterations")]
    pub max_split_iterations: usize,
    #[serde(default = "default_min_pool_liquidity")]
    pub min_pool_liquidity: u64,
    #[serde(default)]
    pub route_update_height_interval: u64,
    #[serde(default = "default_false")]
    pub route_cache_enabled: bool,
    #[serde(default = "default_route_cache_expiry_seconds")]
    pub route_cache_expiry_seconds: u64,
    #[serde(default)]
    pub preferred_pool_ids: Vec<u64>,
}

fn default_max_pools_per_route() -> usize {
    4
}
fn default_max_routes() -> usize {
    5
}
fn default_max_split_routes() -> usize {
    3
}
fn default_max_split_iterations() -> usize {
    10
}
fn default_min_pool_liquidity() -> u64 {
    10_000
}
fn default_route_cache_expiry_seconds() -> u64 {
    600 // 10 minutes
}
fn default_false() -> bool {
    false
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_pools_per_route: default_max_pools_per_route(),
            max_routes: default_max_routes(),
            max_split_routes: default_max_split_routes(),
            max_split_iterations: default_max_split_iterations(),
            min_pool_liquidity: default_min_pool_liquidity(),
            route_update_height_interval: 0,
            route_cache_enabled: default_false(), // Por defecto deshabilitado
            route_cache_expiry_seconds: default_route_cache_expiry_seconds(),
            preferred_pool_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_pricing_cache_expiry_ms")]
    pub cache_expiry_ms: u64,
    #[serde(default)]
    pub default_source: PricingSourceType,
    #[serde(default = "default_quote_denom")]
    pub default_quote_denom: String,
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_coingecko_quote_currency")]
    pub coingecko_quote_currency: String,
}

fn default_pricing_cache_expiry_ms() -> u64 {
    2000 // 2 seconds, roughly one block
}
fn default_quote_denom() -> String {
    "usdc".to_string()
}
fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_coingecko_quote_currency() -> String {
    "usd".to_string()
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache_expiry_ms: default_pricing_cache_expiry_ms(),
            default_source: PricingSourceType::default(),
            default_quote_denom: default_quote_denom(),
            coingecko_url: default_coingecko_url(),
            coingecko_quote_currency: default_coingecko_quote_currency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_max_allowed_height_update_delta_secs")]
    pub max_allowed_height_update_delta_secs: u64,
    #[serde(default = "default_height_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_max_allowed_height_update_delta_secs() -> u64 {
    30
}
fn default_height_check_timeout_ms() -> u64 {
    5000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_allowed_height_update_delta_secs: default_max_allowed_height_update_delta_secs(),
            check_timeout_ms: default_height_check_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory, if present, then
    /// applies `SIDECAR_*` environment overrides. Missing file means defaults.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Loads settings from an explicit TOML file without env overrides.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(url) = env::var("SIDECAR_REDIS_URL") {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            settings.storage.redis_url = trimmed.to_string();
        }
    }
    if let Ok(denom) = env::var("SIDECAR_DEFAULT_QUOTE_DENOM") {
        let trimmed = denom.trim();
        if !trimmed.is_empty() {
            settings.pricing.default_quote_denom = trimmed.to_string();
        }
    }
    if let Ok(raw) = env::var("SIDECAR_ROUTE_CACHE_ENABLED") {
        match raw.trim().parse::<bool>() {
            Ok(enabled) => settings.router.route_cache_enabled = enabled,
            Err(_) => eprintln!("Failed to parse SIDECAR_ROUTE_CACHE_ENABLED as bool: {raw}"),
        }
    }
    if let Ok(raw) = env::var("SIDECAR_PREFERRED_POOL_IDS") {
        match parse_pool_id_list(&raw) {
            Some(ids) => settings.router.preferred_pool_ids = ids,
            None => eprintln!("Failed to parse SIDECAR_PREFERRED_POOL_IDS: {raw}"),
        }
    }
}

// Accepts either a JSON array ("[1, 2]") or a comma-separated list ("1,2")
fn parse_pool_id_list(input: &str) -> Option<Vec<u64>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(ids) = serde_json::from_str::<Vec<u64>>(trimmed) {
            return Some(ids);
        }
    }

    let mut ids = Vec::new();
    for part in trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
    {
        let part = part.trim().trim_matches('"');
        if part.is_empty() {
            continue;
        }
        match part.parse::<u64>() {
            Ok(id) => ids.push(id),
            Err(_) => return None,
        }
    }
    Some(ids)
}
