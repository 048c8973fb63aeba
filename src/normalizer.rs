// Provider response normalizer: aggregate response in, merged ride list out

use crate::category::{CategoryClassifier, ALL_CATEGORY};
use crate::config::{ConfigError, NormalizerConfig, ProviderConfig};
use crate::extractor::extract;
use crate::merger::{build_fallback_sets, group_flat_items, merge, FallbackSets, ProviderResult};
use crate::raw_response::{ingest, IngestedResponse, RawProviderBlock};
use crate::ride::{NormalizedRides, RideOption, STANDARD_CATEGORY};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

// Compare-screen filters; `None` fields do not filter
#[derive(Debug, Clone, Default)]
pub struct RideFilter {
    pub category: Option<String>,
    pub company: Option<String>,
    pub fleet_type_contains: Option<String>,
}

pub struct RideNormalizer {
    config: NormalizerConfig,
    classifier: CategoryClassifier,
    fallbacks: FallbackSets,
}

impl RideNormalizer {
    // Rejects configs whose provider names would produce colliding ride ids
    pub fn new(config: NormalizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: NormalizerConfig) -> Self {
        let classifier = CategoryClassifier::new(&config.categories);
        let fallbacks = build_fallback_sets(&config.providers, &classifier);
        Self {
            config,
            classifier,
            fallbacks,
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    pub fn fallback_sets(&self) -> &FallbackSets {
        &self.fallbacks
    }

    // Normalize an already-parsed aggregate response; never fails
    pub fn normalize(&self, response: &Value) -> NormalizedRides {
        let is_provider = |key: &str| self.config.provider(key).is_some();
        let blocks = match ingest(response, &is_provider) {
            IngestedResponse::ProviderMap(map) => self.blocks_from_map(map),
            IngestedResponse::FlatList(items) => group_flat_items(items, &self.config.providers),
            IngestedResponse::Unrecognized => {
                vec![RawProviderBlock::Empty; self.config.providers.len()]
            }
        };

        let results = self
            .config
            .providers
            .iter()
            .zip(blocks.iter())
            .map(|(provider, block)| ProviderResult {
                provider: provider.name.clone(),
                extraction: extract(provider, block, &self.classifier),
            })
            .collect();

        let rides = merge(results, &self.fallbacks);
        info!(
            options = rides.options.len(),
            live = rides.live_count(),
            degraded = rides.degraded,
            "normalized ride options"
        );
        rides
    }

    pub fn normalize_str(&self, json: &str) -> Result<NormalizedRides, NormalizeError> {
        let response: Value = serde_json::from_str(json)?;
        Ok(self.normalize(&response))
    }

    // Result used when the aggregate response could not be fetched at all
    pub fn fallback_only(&self) -> NormalizedRides {
        self.normalize(&Value::Null)
    }

    // One block per configured provider, in priority order
    fn blocks_from_map<'a>(&self, map: &'a Map<String, Value>) -> Vec<RawProviderBlock<'a>> {
        for key in map.keys() {
            if self.config.provider(key).is_none() {
                debug!(key = %key, "ignoring unknown provider key");
            }
        }

        self.config
            .providers
            .iter()
            .map(|provider| {
                find_provider_block(map, provider).unwrap_or_else(|| {
                    debug!(provider = %provider.name, "provider absent from response");
                    RawProviderBlock::Empty
                })
            })
            .collect()
    }

    pub fn filter_options(&self, rides: &NormalizedRides, filter: &RideFilter) -> Vec<RideOption> {
        let mut filtered = Vec::new();

        for ride in &rides.options {
            if !filter
                .category
                .as_ref()
                .map_or(true, |c| c == ALL_CATEGORY || ride.category.eq_ignore_ascii_case(c))
            {
                continue;
            }

            if !filter
                .company
                .as_ref()
                .map_or(true, |c| ride.company.eq_ignore_ascii_case(c.trim()))
            {
                continue;
            }

            if !filter.fleet_type_contains.as_ref().map_or(true, |s| {
                ride.fleet_type.to_lowercase().contains(&s.to_lowercase())
            }) {
                continue;
            }

            filtered.push(ride.clone());
        }

        filtered
    }

    // Groups in category-table order, `Standard` last; empty groups are left out
    pub fn group_by_category<'r>(&self, options: &'r [RideOption]) -> Vec<(String, Vec<&'r RideOption>)> {
        let mut names: Vec<&str> = self.classifier.categories().collect();
        if !names.contains(&STANDARD_CATEGORY) {
            names.push(STANDARD_CATEGORY);
        }

        names
            .into_iter()
            .map(|name| {
                let members: Vec<&RideOption> =
                    options.iter().filter(|o| o.category == name).collect();
                (name.to_string(), members)
            })
            .filter(|(_, members)| !members.is_empty())
            .collect()
    }
}

impl Default for RideNormalizer {
    fn default() -> Self {
        Self::build(NormalizerConfig::default())
    }
}

// Among the keys naming `provider` (exact key first, then other casings) the
// first block carrying options wins; otherwise the first matching block
fn find_provider_block<'a>(
    map: &'a Map<String, Value>,
    provider: &ProviderConfig,
) -> Option<RawProviderBlock<'a>> {
    let exact = map.get(&provider.name);
    let others = map
        .iter()
        .filter(|(key, _)| key.as_str() != provider.name && provider.matches(key))
        .map(|(_, value)| value);

    let mut first = None;
    for value in exact.into_iter().chain(others) {
        let block = RawProviderBlock::from_value(value);
        if !block.options().is_empty() {
            return Some(block);
        }
        first.get_or_insert(block);
    }
    first
}

// Sample file paths (the actual files are stored in the samples directory)
pub const SAMPLE_RESPONSE_PATH: &str = "samples/aggregate_response.json";
