// Normalizer configuration: known providers, their extraction policies and fallback sets

use crate::category::{default_category_rules, CategoryRule};
use crate::ride::provider_slug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// How the ETA column is filled for a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "text", rename_all = "snake_case")]
pub enum EtaPolicy {
    // Raw `eta` if the provider sent one, empty otherwise
    Passthrough,
    // Always the given placeholder range
    Placeholder(String),
    Empty,
}

impl Default for EtaPolicy {
    fn default() -> Self {
        EtaPolicy::Passthrough
    }
}

// Turns a point estimate into a `low - high` display range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBand {
    pub delta: f64,
    pub separator: String,
}

impl Default for PriceBand {
    fn default() -> Self {
        Self {
            delta: 5.0,
            separator: " - ".to_string(),
        }
    }
}

// A canned ride shown when the provider has no live data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRide {
    pub fleet_type: String,
    #[serde(default)]
    pub eta: String,
    pub price: String,
}

impl FallbackRide {
    pub fn new(fleet_type: &str, eta: &str, price: &str) -> Self {
        Self {
            fleet_type: fleet_type.to_string(),
            eta: eta.to_string(),
            price: price.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    // Checked in order; the first key holding a usable price wins
    pub price_keys: Vec<String>,
    pub eta_policy: EtaPolicy,
    pub price_band: Option<PriceBand>,
    pub currency_symbol: String,
    pub fallback: Vec<FallbackRide>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            price_keys: default_price_keys(),
            eta_policy: EtaPolicy::Passthrough,
            price_band: None,
            currency_symbol: "₹".to_string(),
            fallback: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_eta_policy(mut self, policy: EtaPolicy) -> Self {
        self.eta_policy = policy;
        self
    }

    pub fn with_price_band(mut self, band: PriceBand) -> Self {
        self.price_band = Some(band);
        self
    }

    pub fn with_fallback(mut self, fallback: Vec<FallbackRide>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn matches(&self, provider_key: &str) -> bool {
        self.name.eq_ignore_ascii_case(provider_key.trim())
    }
}

pub fn default_price_keys() -> Vec<String> {
    vec![
        "price".to_string(),
        "fare".to_string(),
        "price_range".to_string(),
    ]
}

pub fn uber_provider() -> ProviderConfig {
    ProviderConfig::new("Uber").with_fallback(vec![
        FallbackRide::new("Mini", "3 mins", "₹149"),
        FallbackRide::new("Prime", "4 mins", "₹199"),
        FallbackRide::new("XL", "8 mins", "₹299"),
    ])
}

pub fn rapido_provider() -> ProviderConfig {
    ProviderConfig::new("Rapido")
        .with_eta_policy(EtaPolicy::Placeholder("2-5 mins".to_string()))
        .with_price_band(PriceBand::default())
        .with_fallback(vec![
            FallbackRide::new("Bike", "2 mins", "₹79"),
            FallbackRide::new("Auto", "3 mins", "₹115"),
        ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    // Declaration order is provider priority order
    pub providers: Vec<ProviderConfig>,
    pub categories: Vec<CategoryRule>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            providers: vec![uber_provider(), rapido_provider()],
            categories: default_category_rules(),
        }
    }
}

impl NormalizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: NormalizerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    // Provider slugs prefix ride ids, so they must be distinct and must not
    // look like another provider's fallback prefix (`{slug}-mock`)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            let slug = provider_slug(&provider.name);
            if slug.is_empty() {
                return Err(ConfigError::Invalid("provider name is empty".to_string()));
            }
            if !seen.insert(slug) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider: {}",
                    provider.name
                )));
            }
            if let Some(band) = &provider.price_band {
                if !band.delta.is_finite() || band.delta < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "price band delta for {} must be a non-negative number",
                        provider.name
                    )));
                }
            }
        }
        if let Some(slug) = seen
            .iter()
            .find(|slug| seen.contains(&format!("{}-mock", slug)))
        {
            return Err(ConfigError::Invalid(format!(
                "provider ids for {0} and {0}-mock would collide",
                slug
            )));
        }
        Ok(())
    }

    pub fn provider(&self, provider_key: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.matches(provider_key))
    }
}
