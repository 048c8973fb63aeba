// Ride-price API client
// Fetches the raw aggregate response for one search; retries transient failures with backoff

use crate::location::Coordinates;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code}")]
    ApiResponseError { status_code: u16, is_retryable: bool },

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NetworkError(_) | FetchError::Timeout(_) => true,
            FetchError::ApiResponseError { is_retryable, .. } => *is_retryable,
            FetchError::InvalidResponse(_) | FetchError::InvalidRequest(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            retry_config: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub requests_timeout: usize,
    pub average_response_time_ms: f64,
}

/// One ride-price search between two geocoded places.
#[derive(Debug, Clone, PartialEq)]
pub struct RidePriceRequest {
    pub start_place: String,
    pub destination_place: String,
    pub pickup: Coordinates,
    pub drop: Coordinates,
}

impl RidePriceRequest {
    pub fn new(start_place: &str, destination_place: &str, pickup: Coordinates, drop: Coordinates) -> Self {
        Self {
            start_place: start_place.to_string(),
            destination_place: destination_place.to_string(),
            pickup,
            drop,
        }
    }

    // A zero latitude or longitude is what an unresolved location looks like, so it is rejected
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.start_place.trim().is_empty() || self.destination_place.trim().is_empty() {
            return Err(FetchError::InvalidRequest(
                "Missing source or destination location names".to_string(),
            ));
        }

        for (label, coords) in [("pickup", &self.pickup), ("drop", &self.drop)] {
            let Coordinates {
                latitude,
                longitude,
            } = *coords;
            if !latitude.is_finite() || !longitude.is_finite() {
                return Err(FetchError::InvalidRequest(format!("{} coordinates are not finite", label)));
            }
            if latitude == 0.0 || longitude == 0.0 {
                return Err(FetchError::InvalidRequest(format!("Invalid {} coordinates", label)));
            }
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(FetchError::InvalidRequest(format!("{} coordinates out of range", label)));
            }
        }

        Ok(())
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("start_place", self.start_place.trim().to_string()),
            ("destination_place", self.destination_place.trim().to_string()),
            ("pickup_lat", format!("{:.6}", self.pickup.latitude)),
            ("pickup_lng", format!("{:.6}", self.pickup.longitude)),
            ("drop_lat", format!("{:.6}", self.drop.latitude)),
            ("drop_lng", format!("{:.6}", self.drop.longitude)),
        ]
    }
}

#[async_trait]
pub trait RidePriceClient: Send + Sync {
    // Raw aggregate response for the request
    async fn fetch(&self, request: &RidePriceRequest) -> Result<Value, FetchError>;

    fn stats(&self) -> ClientStats;
}

pub struct HttpRidePriceClient {
    http: reqwest::Client,
    config: ClientConfig,
    stats: Mutex<ClientStats>,
}

impl HttpRidePriceClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::ConfigError("base_url is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http,
            config,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/ride-options", self.config.base_url.trim_end_matches('/'))
    }

    // Exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    async fn fetch_once(&self, request: &RidePriceRequest) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(self.endpoint())
            .header(ACCEPT, "application/json")
            .query(&request.query_params())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ApiResponseError {
                status_code: status.as_u16(),
                is_retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.config.timeout_ms)
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }

    fn record(&self, result: &Result<Value, FetchError>, elapsed: Duration) {
        let mut stats = self.stats.lock();
        stats.requests_sent += 1;
        match result {
            Ok(_) => stats.requests_succeeded += 1,
            Err(err) => {
                stats.requests_failed += 1;
                if matches!(err, FetchError::Timeout(_)) {
                    stats.requests_timeout += 1;
                }
            }
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let n = stats.requests_sent as f64;
        stats.average_response_time_ms += (elapsed_ms - stats.average_response_time_ms) / n;
    }
}

#[async_trait]
impl RidePriceClient for HttpRidePriceClient {
    async fn fetch(&self, request: &RidePriceRequest) -> Result<Value, FetchError> {
        request.validate()?;

        let retry_config = &self.config.retry_config;
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let result = self.fetch_once(request).await;
            self.record(&result, started.elapsed());

            match result {
                Ok(value) => {
                    debug!(attempt, "ride prices fetched");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < retry_config.max_retries => {
                    let backoff = Self::calculate_backoff(attempt, retry_config);
                    warn!(attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "retrying ride price fetch");
                    self.stats.lock().requests_retried += 1;
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RidePriceRequest {
        RidePriceRequest::new(
            " Amrita Nagar, Bengaluru ",
            "Marathahalli, Bengaluru",
            Coordinates::new(12.8924, 77.6751),
            Coordinates::new(12.9569, 77.7011),
        )
    }

    fn test_client(base_url: &str, max_retries: u32) -> HttpRidePriceClient {
        HttpRidePriceClient::new(ClientConfig {
            base_url: base_url.to_string(),
            timeout_ms: 5_000,
            retry_config: RetryConfig {
                max_retries,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                ..Default::default()
            },
        })
        .unwrap()
    }

    #[test_case(Coordinates::new(0.0, 0.0), Coordinates::new(12.9, 77.7); "zero pickup")]
    #[test_case(Coordinates::new(12.9, 77.7), Coordinates::new(12.9, 0.0); "zero drop longitude")]
    #[test_case(Coordinates::new(f64::NAN, 77.7), Coordinates::new(12.9, 77.7); "nan latitude")]
    #[test_case(Coordinates::new(95.0, 77.7), Coordinates::new(12.9, 77.7); "latitude out of range")]
    fn test_invalid_coordinates_rejected(pickup: Coordinates, drop: Coordinates) {
        let request = RidePriceRequest::new("A", "B", pickup, drop);
        assert!(matches!(request.validate(), Err(FetchError::InvalidRequest(_))));
    }

    #[test]
    fn test_missing_place_names_rejected() {
        let mut request = request();
        request.destination_place = "   ".to_string();
        tokio_test::assert_err!(request.validate());
        tokio_test::assert_ok!(self::request().validate());
    }

    #[test]
    fn test_query_params_format() {
        let params = request().query_params();
        assert_eq!(params[0], ("start_place", "Amrita Nagar, Bengaluru".to_string()));
        assert_eq!(params[2], ("pickup_lat", "12.892400".to_string()));
        assert_eq!(params[5], ("drop_lng", "77.701100".to_string()));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(HttpRidePriceClient::calculate_backoff(0, &config), Duration::from_millis(100));
        assert_eq!(HttpRidePriceClient::calculate_backoff(2, &config), Duration::from_millis(400));
        assert_eq!(HttpRidePriceClient::calculate_backoff(8, &config), Duration::from_millis(1000));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let config = ClientConfig {
            base_url: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpRidePriceClient::new(config), Err(ClientError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ride-options"))
            .and(header("accept", "application/json"))
            .and(query_param("start_place", "Amrita Nagar, Bengaluru"))
            .and(query_param("drop_lat", "12.956900"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Rapido": {"service": "Rapido", "options": [{"fleet": "Bike", "fare": "₹134"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let value = client.fetch(&request()).await.unwrap();
        assert_eq!(value["Rapido"]["options"][0]["fleet"], "Bike");

        let stats = client.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.requests_succeeded, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ride-options"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ride-options"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        assert!(client.fetch(&request()).await.is_ok());

        let stats = client.stats();
        assert_eq!(stats.requests_sent, 2);
        assert_eq!(stats.requests_retried, 1);
        assert_eq!(stats.requests_failed, 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(422))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let result = client.fetch(&request()).await;
        assert!(matches!(
            result,
            Err(FetchError::ApiResponseError { status_code: 422, is_retryable: false })
        ));
        assert_eq!(client.stats().requests_retried, 0);
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>tunnel offline</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        assert!(matches!(
            client.fetch(&request()).await,
            Err(FetchError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_request_never_hits_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let mut bad = request();
        bad.pickup = Coordinates::new(0.0, 0.0);
        assert!(matches!(client.fetch(&bad).await, Err(FetchError::InvalidRequest(_))));
        assert_eq!(client.stats().requests_sent, 0);
    }
}
