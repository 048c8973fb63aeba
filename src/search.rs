// Search service: geocode, fetch, normalize

use crate::api_client::{FetchError, RidePriceClient, RidePriceRequest};
use crate::location::{GeoError, Geocoder};
use crate::normalizer::RideNormalizer;
use crate::ride::NormalizedRides;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Geocoding failed: {0}")]
    Geocoding(#[from] GeoError),
}

pub struct RideSearch<F> {
    client: F,
    normalizer: Arc<RideNormalizer>,
}

impl<F: RidePriceClient> RideSearch<F> {
    pub fn new(client: F, normalizer: Arc<RideNormalizer>) -> Self {
        Self { client, normalizer }
    }

    pub fn client(&self) -> &F {
        &self.client
    }

    pub fn normalizer(&self) -> &RideNormalizer {
        &self.normalizer
    }

    /// Fetches and normalizes ride options for `request`.
    ///
    /// An invalid request is an error. A failed fetch is not: every provider
    /// is treated as absent and the estimated fallback sets are returned,
    /// flagged as degraded.
    pub async fn search(&self, request: &RidePriceRequest) -> Result<NormalizedRides, SearchError> {
        request
            .validate()
            .map_err(|e| SearchError::InvalidRequest(e.to_string()))?;

        match self.client.fetch(request).await {
            Ok(response) => Ok(self.normalizer.normalize(&response)),
            Err(FetchError::InvalidRequest(message)) => Err(SearchError::InvalidRequest(message)),
            Err(err) => {
                warn!(error = %err, "ride price fetch failed, showing estimated prices");
                Ok(self.normalizer.fallback_only())
            }
        }
    }
}

// Geocodes both places concurrently into a ride-price request
pub async fn resolve_request<G: Geocoder + ?Sized>(
    geocoder: &G,
    from: &str,
    to: &str,
) -> Result<RidePriceRequest, SearchError> {
    if from.trim().is_empty() || to.trim().is_empty() {
        return Err(SearchError::InvalidRequest(
            "Missing source or destination location names".to_string(),
        ));
    }

    let (pickup, drop) = futures::join!(geocoder.geocode(from), geocoder.geocode(to));
    let pickup = pickup?.ok_or_else(|| SearchError::LocationNotFound(from.trim().to_string()))?;
    let drop = drop?.ok_or_else(|| SearchError::LocationNotFound(to.trim().to_string()))?;

    info!(from = %from.trim(), to = %to.trim(), "resolved search locations");
    Ok(RidePriceRequest::new(from.trim(), to.trim(), pickup, drop))
}
