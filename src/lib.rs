// Ride-price comparison library: provider response normalization plus the fetch and geocoding around it

pub mod api_client;
pub mod category;
pub mod config;
pub mod expiring_cache;
pub mod extractor;
pub mod location;
pub mod merger;
pub mod normalizer;
pub mod raw_response;
pub mod ride;
pub mod search;

// Re-export key types for convenience
pub use api_client::{
    ClientConfig, ClientError, ClientStats, FetchError, HttpRidePriceClient, RetryConfig,
    RidePriceClient, RidePriceRequest,
};
pub use category::{CategoryClassifier, CategoryRule, ALL_CATEGORY};
pub use config::{ConfigError, EtaPolicy, FallbackRide, NormalizerConfig, PriceBand, ProviderConfig};
pub use expiring_cache::{CacheConfig, CacheStatsReport, Clock, ExpiringCache, ManualClock, SystemClock};
pub use location::{
    CachedGeocoder, Coordinates, GeoError, Geocoder, GeocoderConfig, LocationSuggestion,
    NominatimGeocoder,
};
pub use normalizer::{NormalizeError, RideFilter, RideNormalizer};
pub use ride::{NormalizedRides, RideOption, RideSource};
pub use search::{resolve_request, RideSearch, SearchError};
