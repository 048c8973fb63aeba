// Normalized ride data handed back to callers after a normalization pass

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STANDARD_CATEGORY: &str = "Standard";
pub const ESTIMATED_PRICES_NOTICE: &str = "Showing estimated prices";

// Where a ride option came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideSource {
    Live,
    Estimated,
}

// One row in the comparison list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOption {
    pub id: String,
    pub company: String,
    pub fleet_type: String,
    pub eta: String,
    pub price: String,
    pub category: String,
    pub source: RideSource,
}

impl RideOption {
    pub fn is_live(&self) -> bool {
        self.source == RideSource::Live
    }
}

// Lower-cased provider name used as the id prefix, spaces collapsed to dashes
pub fn provider_slug(provider: &str) -> String {
    provider
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub fn live_ride_id(provider: &str, index: usize) -> String {
    format!("{}-{}", provider_slug(provider), index)
}

pub fn mock_ride_id(provider: &str, n: usize) -> String {
    format!("{}-mock-{}", provider_slug(provider), n)
}

/// Result of one normalization pass.
///
/// `availability` maps every configured provider to whether it produced live
/// data. `degraded` is set when no configured provider did, in which case
/// `options` holds every fallback set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedRides {
    pub options: Vec<RideOption>,
    pub availability: BTreeMap<String, bool>,
    pub degraded: bool,
}

impl NormalizedRides {
    pub fn notice(&self) -> Option<&'static str> {
        self.degraded.then_some(ESTIMATED_PRICES_NOTICE)
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.availability.get(provider).copied().unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.options.iter().filter(|o| o.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Uber", 0, "uber-0")]
    #[test_case("Rapido", 3, "rapido-3")]
    #[test_case("  Namma Yatri ", 1, "namma-yatri-1")]
    fn test_live_ride_id(provider: &str, index: usize, expected: &str) {
        assert_eq!(live_ride_id(provider, index), expected);
    }

    #[test]
    fn test_mock_ride_id() {
        assert_eq!(mock_ride_id("Rapido", 2), "rapido-mock-2");
    }

    #[test]
    fn test_notice_only_when_degraded() {
        let mut rides = NormalizedRides::default();
        assert_eq!(rides.notice(), None);

        rides.degraded = true;
        assert_eq!(rides.notice(), Some("Showing estimated prices"));
    }

    #[test]
    fn test_ride_option_serializes_camel_case() {
        let option = RideOption {
            id: "uber-0".to_string(),
            company: "Uber".to_string(),
            fleet_type: "Go".to_string(),
            eta: "3 mins".to_string(),
            price: "₹200".to_string(),
            category: "Economy".to_string(),
            source: RideSource::Live,
        };

        let json = serde_json::to_value(&option).unwrap();
        assert_eq!(json["fleetType"], "Go");
        assert_eq!(json["source"], "live");
    }
}
