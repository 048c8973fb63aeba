// Geocoding and place suggestions
// Nominatim-backed lookups, with an optional caching wrapper keyed by normalized text

use crate::expiring_cache::{CacheConfig, Clock, ExpiringCache, SystemClock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// Suggestions are only looked up once the input is at least this long
pub const MIN_SUGGESTION_CHARS: usize = 3;
pub const SUGGESTION_LIMIT: usize = 5;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Geocoder returned status {0}")]
    HttpStatus(u16),

    #[error("Geocoder response parse error: {0}")]
    ParseError(String),

    #[error("Client error: {0}")]
    ClientError(String),
}

impl From<reqwest::Error> for GeoError {
    fn from(err: reqwest::Error) -> Self {
        GeoError::NetworkError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSuggestion {
    pub id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationSuggestion {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    // Coordinates of the best match, `None` when nothing matched
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeoError>;

    async fn suggest(&self, partial: &str) -> Result<Vec<LocationSuggestion>, GeoError>;
}

// Cache key for free-text input
pub fn normalize_query(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub cache_max_items: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("ridewise/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 10_000,
            cache_ttl_seconds: 300,
            cache_max_items: 512,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    place_id: serde_json::Value,
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimPlace {
    fn coordinates(&self) -> Option<Coordinates> {
        let latitude = self.lat.trim().parse::<f64>().ok()?;
        let longitude = self.lon.trim().parse::<f64>().ok()?;
        Some(Coordinates::new(latitude, longitude))
    }

    fn into_suggestion(self) -> Option<LocationSuggestion> {
        let coordinates = self.coordinates()?;
        let id = match &self.place_id {
            serde_json::Value::String(id) => id.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        let name = self
            .display_name
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        Some(LocationSuggestion {
            id,
            name,
            address: self.display_name,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        })
    }
}

pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GeoError::ClientError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<NominatimPlace>, GeoError> {
        let limit = limit.to_string();
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("q", query), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GeoError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeoError> {
        let query = normalize_query(address);
        if query.is_empty() {
            return Ok(None);
        }

        let places = self.search(&query, 1).await?;
        Ok(places.first().and_then(NominatimPlace::coordinates))
    }

    async fn suggest(&self, partial: &str) -> Result<Vec<LocationSuggestion>, GeoError> {
        let query = normalize_query(partial);
        if query.chars().count() < MIN_SUGGESTION_CHARS {
            return Ok(Vec::new());
        }

        let places = self.search(&query, SUGGESTION_LIMIT).await?;
        Ok(places
            .into_iter()
            .filter_map(NominatimPlace::into_suggestion)
            .collect())
    }
}

/// Caches results of any [`Geocoder`] by normalized input text.
///
/// Misses (`None`) are cached as well so repeated unknown addresses do not
/// hit the network again. Errors are never cached.
pub struct CachedGeocoder<G, C = SystemClock> {
    inner: G,
    geocodes: ExpiringCache<Option<Coordinates>, C>,
    suggestions: ExpiringCache<Vec<LocationSuggestion>, C>,
}

impl<G: Geocoder> CachedGeocoder<G, SystemClock> {
    pub fn new(inner: G, config: &GeocoderConfig) -> Self {
        Self::with_clock(inner, config, SystemClock)
    }
}

impl<G: Geocoder, C: Clock + Clone> CachedGeocoder<G, C> {
    pub fn with_clock(inner: G, config: &GeocoderConfig, clock: C) -> Self {
        let cache_config = CacheConfig {
            default_ttl_seconds: config.cache_ttl_seconds,
            max_items: config.cache_max_items,
        };
        Self {
            inner,
            geocodes: ExpiringCache::with_clock(cache_config.clone(), clock.clone()),
            suggestions: ExpiringCache::with_clock(cache_config, clock),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Geocoder, C: Clock + Clone> Geocoder for CachedGeocoder<G, C> {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeoError> {
        let key = normalize_query(address);
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.geocodes.get(&key) {
            return Ok(cached);
        }

        let result = self.inner.geocode(&key).await?;
        debug!(address = %key, found = result.is_some(), "geocoded address");
        if !self.geocodes.put(&key, result, None) {
            debug!(address = %key, "geocode cache rejected entry");
        }
        Ok(result)
    }

    async fn suggest(&self, partial: &str) -> Result<Vec<LocationSuggestion>, GeoError> {
        let key = normalize_query(partial);
        if key.chars().count() < MIN_SUGGESTION_CHARS {
            return Ok(Vec::new());
        }
        if let Some(cached) = self.suggestions.get(&key) {
            return Ok(cached);
        }

        let suggestions = self.inner.suggest(&key).await?;
        if !self.suggestions.put(&key, suggestions.clone(), None) {
            debug!(query = %key, "suggestion cache rejected entry");
        }
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiring_cache::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Counts calls and answers from a fixed table
    #[derive(Default)]
    struct CountingGeocoder {
        geocode_calls: AtomicUsize,
        suggest_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeoError> {
            self.geocode_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeoError::HttpStatus(503));
            }
            Ok((address == "koramangala").then(|| Coordinates::new(12.9352, 77.6245)))
        }

        async fn suggest(&self, partial: &str) -> Result<Vec<LocationSuggestion>, GeoError> {
            self.suggest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![LocationSuggestion {
                id: "1".to_string(),
                name: partial.to_string(),
                address: partial.to_string(),
                latitude: 1.0,
                longitude: 2.0,
            }])
        }
    }

    fn test_config(base_url: &str) -> GeocoderConfig {
        GeocoderConfig {
            base_url: base_url.to_string(),
            user_agent: "ridewise-test/0.1".to_string(),
            timeout_ms: 5_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cache_keys_are_normalized() {
        let cached = CachedGeocoder::new(CountingGeocoder::default(), &GeocoderConfig::default());

        let first = cached.geocode("  Koramangala ").await.unwrap();
        let second = cached.geocode("KORAMANGALA").await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_some());
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misses_are_cached_until_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cached = CachedGeocoder::with_clock(
            CountingGeocoder::default(),
            &GeocoderConfig::default(),
            Arc::clone(&clock),
        );

        assert_eq!(cached.geocode("atlantis").await.unwrap(), None);
        assert_eq!(cached.geocode("atlantis").await.unwrap(), None);
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(300));
        assert_eq!(cached.geocode("atlantis").await.unwrap(), None);
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_cache_still_answers() {
        let config = GeocoderConfig {
            cache_max_items: 0,
            ..Default::default()
        };
        let cached = CachedGeocoder::new(CountingGeocoder::default(), &config);

        assert!(cached.geocode("koramangala").await.unwrap().is_some());
        assert!(cached.geocode("koramangala").await.unwrap().is_some());
        assert_eq!(cached.suggest("indiranagar").await.unwrap().len(), 1);
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let failing = CountingGeocoder {
            fail: true,
            ..Default::default()
        };
        let cached = CachedGeocoder::new(failing, &GeocoderConfig::default());

        assert!(cached.geocode("koramangala").await.is_err());
        assert!(cached.geocode("koramangala").await.is_err());
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_input_skips_lookup() {
        let cached = CachedGeocoder::new(CountingGeocoder::default(), &GeocoderConfig::default());

        assert!(cached.suggest("hs").await.unwrap().is_empty());
        assert!(cached.suggest("   ").await.unwrap().is_empty());
        assert_eq!(cached.geocode("").await.unwrap(), None);

        assert_eq!(cached.suggest("hsr").await.unwrap().len(), 1);
        assert_eq!(cached.suggest("HSR ").await.unwrap().len(), 1);
        assert_eq!(cached.inner().suggest_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.inner().geocode_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nominatim_geocode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "koramangala, bengaluru"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"place_id": 123, "lat": "12.9352", "lon": "77.6245", "display_name": "Koramangala, Bengaluru"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::new(&test_config(&server.uri())).unwrap();
        let coords = geocoder.geocode(" Koramangala, Bengaluru ").await.unwrap();
        assert_eq!(coords, Some(Coordinates::new(12.9352, 77.6245)));
    }

    #[tokio::test]
    async fn test_nominatim_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::new(&test_config(&server.uri())).unwrap();
        assert_eq!(geocoder.geocode("nowhere at all").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_nominatim_suggestions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"place_id": 1, "lat": "12.9569", "lon": "77.7011", "display_name": "Marathahalli, Bengaluru, Karnataka"},
                {"place_id": "2", "lat": "bad", "lon": "77.0", "display_name": "Broken"},
                {"place_id": 3, "lat": "12.9", "lon": "77.6", "display_name": "Marathahalli Bridge, Bengaluru"}
            ])))
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::new(&test_config(&server.uri())).unwrap();
        let suggestions = geocoder.suggest("Marat").await.unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].id, "1");
        assert_eq!(suggestions[0].name, "Marathahalli");
        assert_eq!(suggestions[0].address, "Marathahalli, Bengaluru, Karnataka");
        assert_eq!(suggestions[1].name, "Marathahalli Bridge");
    }

    #[tokio::test]
    async fn test_nominatim_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::new(&test_config(&server.uri())).unwrap();
        assert!(matches!(
            geocoder.geocode("koramangala").await,
            Err(GeoError::HttpStatus(429))
        ));
    }
}
