//! Google Maps Platform collaborators.
//!
//! Provides a [`GoogleGeocoder`] backed by the Geocoding REST API and an
//! [`HttpScriptLoader`] that fetches the Maps JavaScript API script URL.
//!
//! # API Endpoints
//!
//! - Geocoding: `https://maps.googleapis.com/maps/api/geocode/json?address={ADDRESS}&key={API_KEY}`
//! - Script: `{script_url}?key={API_KEY}&callback={TOKEN}`
//!
//! There is no JavaScript engine here, so a successfully fetched script
//! yields a [`HeadlessLibrary`] whose geocoder talks to the REST endpoint.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::coord::Coordinate;
use crate::gate::{GateError, LoadRequest, ReadyResult, ScriptLoader};
use crate::provider::{
    AsyncHttpClient, BoxFuture, GeocodeResponse, GeocodeStatus, Geocoder, HeadlessLibrary,
    MapLibrary,
};

/// Geocoding REST endpoint.
pub const GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Default Maps JavaScript API script URL.
pub const DEFAULT_SCRIPT_URL: &str = "https://maps.googleapis.com/maps/api/js";

#[derive(Debug, Deserialize)]
struct GeocodeBody {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Parses a Geocoding API JSON body.
fn parse_geocode_body(body: &[u8]) -> GeocodeResponse {
    match serde_json::from_slice::<GeocodeBody>(body) {
        Ok(parsed) => GeocodeResponse {
            status: GeocodeStatus::from_api(&parsed.status),
            results: parsed
                .results
                .into_iter()
                .map(|r| Coordinate::new(r.geometry.location.lat, r.geometry.location.lng))
                .collect(),
        },
        Err(e) => {
            warn!(error = %e, "Unparseable geocode response");
            GeocodeResponse::status(GeocodeStatus::UnknownError)
        }
    }
}

/// Geocoder using the Google Geocoding REST API.
pub struct GoogleGeocoder<C: AsyncHttpClient> {
    http_client: Arc<C>,
    api_key: Option<String>,
    endpoint: String,
}

impl<C: AsyncHttpClient> GoogleGeocoder<C> {
    pub fn new(http_client: Arc<C>, api_key: Option<String>) -> Self {
        Self::with_endpoint(http_client, api_key, GEOCODE_ENDPOINT)
    }

    /// Creates a geocoder against a custom endpoint.
    pub fn with_endpoint(
        http_client: Arc<C>,
        api_key: Option<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_key,
            endpoint: endpoint.into(),
        }
    }

    /// Builds the request URL for `address`.
    fn build_url(&self, address: &str) -> Option<String> {
        let mut params = vec![("address", address)];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("key", key));
        }
        reqwest::Url::parse_with_params(&self.endpoint, &params)
            .map(String::from)
            .ok()
    }
}

impl<C: AsyncHttpClient> Geocoder for GoogleGeocoder<C> {
    fn geocode(&self, address: &str) -> BoxFuture<'static, GeocodeResponse> {
        let url = self.build_url(address);
        let client = Arc::clone(&self.http_client);
        Box::pin(async move {
            let Some(url) = url else {
                warn!("Geocode endpoint is not a valid URL");
                return GeocodeResponse::status(GeocodeStatus::InvalidRequest);
            };
            match client.get(&url).await {
                Ok(body) => parse_geocode_body(&body),
                Err(e) => {
                    warn!(error = %e, "Geocode request failed");
                    GeocodeResponse::status(GeocodeStatus::UnknownError)
                }
            }
        })
    }
}

/// Loads the Maps JavaScript API script over HTTP.
pub struct HttpScriptLoader<C: AsyncHttpClient> {
    http_client: Arc<C>,
    geocode_endpoint: String,
}

impl<C: AsyncHttpClient> HttpScriptLoader<C> {
    pub fn new(http_client: C) -> Self {
        Self {
            http_client: Arc::new(http_client),
            geocode_endpoint: GEOCODE_ENDPOINT.to_string(),
        }
    }

    /// Overrides the geocoding endpoint handed to the loaded library.
    pub fn with_geocode_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.geocode_endpoint = endpoint.into();
        self
    }
}

impl<C: AsyncHttpClient> ScriptLoader for HttpScriptLoader<C> {
    fn preloaded(&self) -> Option<Arc<dyn MapLibrary>> {
        None
    }

    fn load(&self, request: LoadRequest) -> BoxFuture<'static, ReadyResult> {
        Box::pin(fetch_library(
            Arc::clone(&self.http_client),
            request,
            self.geocode_endpoint.clone(),
        ))
    }
}

/// Fetches the script and builds the library once it arrived.
async fn fetch_library<C: AsyncHttpClient>(
    client: Arc<C>,
    request: LoadRequest,
    geocode_endpoint: String,
) -> ReadyResult {
    let url = request.url()?;
    debug!(url = %url, "Fetching map script");
    client
        .get(&url)
        .await
        .map_err(|e| GateError::Load(e.to_string()))?;

    let geocoder = GoogleGeocoder::with_endpoint(client, request.api_key, geocode_endpoint);
    let library: Arc<dyn MapLibrary> = Arc::new(HeadlessLibrary::new(Arc::new(geocoder)));
    Ok(library)
}
