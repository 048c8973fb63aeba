// Fallback merging: live data where a provider delivered, canned estimates elsewhere

use crate::category::CategoryClassifier;
use crate::config::ProviderConfig;
use crate::extractor::Extraction;
use crate::raw_response::{RawOption, RawProviderBlock};
use crate::ride::{mock_ride_id, NormalizedRides, RideOption, RideSource};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

pub type FallbackSets = HashMap<String, Vec<RideOption>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResult {
    pub provider: String,
    pub extraction: Extraction,
}

pub fn fallback_options(provider: &ProviderConfig, classifier: &CategoryClassifier) -> Vec<RideOption> {
    provider
        .fallback
        .iter()
        .enumerate()
        .map(|(i, ride)| RideOption {
            id: mock_ride_id(&provider.name, i + 1),
            company: provider.name.clone(),
            fleet_type: ride.fleet_type.clone(),
            eta: ride.eta.clone(),
            price: ride.price.clone(),
            category: classifier.classify(&ride.fleet_type).to_string(),
            source: RideSource::Estimated,
        })
        .collect()
}

pub fn build_fallback_sets(providers: &[ProviderConfig], classifier: &CategoryClassifier) -> FallbackSets {
    providers
        .iter()
        .map(|p| (p.name.clone(), fallback_options(p, classifier)))
        .collect()
}

/// Merges per-provider results, given in provider priority order.
///
/// Live providers come first, then the fallback sets of providers without
/// data, both in priority order. When no provider had data the result holds
/// every fallback set and is flagged as degraded.
pub fn merge(results: Vec<ProviderResult>, fallbacks: &FallbackSets) -> NormalizedRides {
    let availability = results
        .iter()
        .map(|r| (r.provider.clone(), r.extraction.had_data))
        .collect();

    let mut options = Vec::new();
    let mut missing = Vec::new();
    for result in results {
        if result.extraction.had_data {
            options.extend(result.extraction.options);
        } else {
            missing.push(result.provider);
        }
    }

    let degraded = options.is_empty();
    if degraded {
        warn!("no provider returned live data, using estimated prices for all providers");
    }

    for provider in missing {
        match fallbacks.get(&provider) {
            Some(set) => {
                debug!(provider = %provider, count = set.len(), "using fallback set");
                options.extend(set.iter().cloned());
            }
            None => debug!(provider = %provider, "no fallback set configured"),
        }
    }

    NormalizedRides {
        options,
        availability,
        degraded,
    }
}

/// Splits a flat list of heterogeneous items into per-provider blocks.
///
/// Items are attributed through their `service`, `company` or `provider`
/// field. An item carrying `options` contributes its options; any other item
/// is taken as a single option entry. Unattributable items are dropped.
pub fn group_flat_items<'a>(
    items: &'a [Value],
    providers: &[ProviderConfig],
) -> Vec<RawProviderBlock<'a>> {
    let mut groups: Vec<Vec<RawOption<'a>>> = vec![Vec::new(); providers.len()];

    for (index, item) in items.iter().enumerate() {
        let raw = RawOption::new(item);
        let Some(position) = raw
            .service()
            .and_then(|service| providers.iter().position(|p| p.matches(service)))
        else {
            debug!(index, "dropping flat-list item without a known provider");
            continue;
        };

        if item.get("options").is_some() {
            groups[position].extend_from_slice(RawProviderBlock::from_value(item).options());
        } else {
            groups[position].push(raw);
        }
    }

    groups
        .into_iter()
        .map(|options| {
            if options.is_empty() {
                RawProviderBlock::Empty
            } else {
                RawProviderBlock::Options(options)
            }
        })
        .collect()
}
