//! Address geocoding.
//!
//! [`GeocodeAdapter`] resolves an address through the loaded library's
//! geocoder and, on success, recenters the map and drops a marker at the
//! result. Non-OK answers are expected while users type and are only logged.
//!
//! # Stale Results
//!
//! Requests cannot be cancelled. Each geocode takes a center fence token
//! from the view before issuing its request; if any newer center change
//! happened by the time the answer arrives, the answer is discarded instead
//! of overwriting the newer center.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coord::Coordinate;
use crate::gate::{GateError, ScriptLoadGate};
use crate::markers::MarkerReconciler;
use crate::provider::GeocodeStatus;
use crate::view::{MapViewController, ViewError};

/// Errors from a geocode attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    View(#[from] ViewError),

    /// The service answered with a non-OK status.
    #[error("Geocoding failed with status {0:?}")]
    Status(GeocodeStatus),

    /// The service answered OK without any result.
    #[error("Geocoding returned no results")]
    NoResults,

    /// A newer center change arrived while the request was in flight.
    #[error("Geocode result superseded by a newer center change")]
    Stale,
}

/// Resolves addresses and shows where they landed.
pub struct GeocodeAdapter {
    gate: Arc<ScriptLoadGate>,
    view: Arc<MapViewController>,
    markers: MarkerReconciler,
}

impl GeocodeAdapter {
    pub fn new(
        gate: Arc<ScriptLoadGate>,
        view: Arc<MapViewController>,
        markers: MarkerReconciler,
    ) -> Self {
        Self {
            gate,
            view,
            markers,
        }
    }

    /// Geocodes `address` with exactly one request.
    ///
    /// On success the map is recentered on the first result and a marker is
    /// added there.
    pub async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let fence = self.view.bump_fence();
        let library = self.gate.ready().await?;

        let response = library.geocoder().geocode(address).await;
        if !response.status.is_ok() {
            return Err(GeocodeError::Status(response.status));
        }
        let location = response
            .results
            .first()
            .copied()
            .ok_or(GeocodeError::NoResults)?;

        self.view.wait_initialized().await?;
        if self.view.fence() != fence {
            return Err(GeocodeError::Stale);
        }

        self.view.set_center(location);
        self.markers.add_marker(location);
        info!(address, %location, "Address geocoded");
        Ok(location)
    }

    /// Property-path variant: failures are logged and swallowed.
    pub async fn address_changed(&self, address: &str) -> Option<Coordinate> {
        if address.trim().is_empty() {
            debug!("Empty address ignored");
            return None;
        }
        match self.geocode(address).await {
            Ok(location) => Some(location),
            Err(GeocodeError::Status(status)) => {
                debug!(address, ?status, "Address did not geocode");
                None
            }
            Err(GeocodeError::Stale) => {
                debug!(address, "Discarding stale geocode result");
                None
            }
            Err(e) => {
                warn!(address, error = %e, "Geocoding failed");
                None
            }
        }
    }
}
