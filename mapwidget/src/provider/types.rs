//! Interface to the external map library.
//!
//! The library itself (rendering, tiles, marker drawing) lives outside this
//! crate. These traits describe the slice of it the widget consumes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::coord::Coordinate;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked with the clicked geographic location.
pub type ClickHandler = Arc<dyn Fn(Coordinate) + Send + Sync>;

/// Default map center (San Francisco).
pub const DEFAULT_CENTER: Coordinate = Coordinate::new(37.77493, -122.41942);

/// Default zoom level.
pub const DEFAULT_ZOOM: i32 = 10;

/// Opaque reference to a marker overlay drawn on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(u64);

impl MarkerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Full set of options a map is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapOptions {
    pub center: Coordinate,
    pub zoom: i32,
    pub disable_default_ui: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            disable_default_ui: false,
        }
    }
}

impl MapOptions {
    /// Applies every field present in `patch`.
    pub fn apply(&mut self, patch: &MapOptionsPatch) {
        if let Some(center) = patch.center {
            self.center = center;
        }
        if let Some(zoom) = patch.zoom {
            self.zoom = zoom;
        }
        if let Some(disable) = patch.disable_default_ui {
            self.disable_default_ui = disable;
        }
    }
}

/// A partial update to [`MapOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MapOptionsPatch {
    pub center: Option<Coordinate>,
    pub zoom: Option<i32>,
    pub disable_default_ui: Option<bool>,
}

impl MapOptionsPatch {
    pub fn is_empty(&self) -> bool {
        self.center.is_none() && self.zoom.is_none() && self.disable_default_ui.is_none()
    }
}

/// Errors raised by the external library when building a surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The named container does not exist or cannot host a map.
    #[error("Map container not found: '{0}'")]
    ContainerNotFound(String),

    /// Any other failure reported by the library.
    #[error("Map library error: {0}")]
    Backend(String),
}

/// A constructed map instance.
///
/// Implementations use interior mutability; every method takes `&self`.
pub trait MapSurface: Send + Sync {
    fn center(&self) -> Coordinate;
    fn set_center(&self, center: Coordinate);
    fn zoom(&self) -> i32;

    /// Sets the zoom level exactly as given (no clamping).
    fn set_zoom(&self, zoom: i32);

    fn set_options(&self, patch: &MapOptionsPatch);

    /// Draws a marker at `position` and returns its handle.
    fn add_marker(&self, position: Coordinate) -> MarkerHandle;

    /// Removes a marker from the map. Unknown handles are ignored.
    fn remove_marker(&self, handle: MarkerHandle);

    /// Registers a click listener on the rendered surface.
    fn on_click(&self, handler: ClickHandler);
}

/// Status codes returned by the geocoding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeocodeStatus {
    Ok,
    ZeroResults,
    OverQueryLimit,
    RequestDenied,
    InvalidRequest,
    UnknownError,
}

impl GeocodeStatus {
    /// Maps the provider's wire status string.
    pub fn from_api(status: &str) -> Self {
        match status {
            "OK" => GeocodeStatus::Ok,
            "ZERO_RESULTS" => GeocodeStatus::ZeroResults,
            "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => GeocodeStatus::OverQueryLimit,
            "REQUEST_DENIED" => GeocodeStatus::RequestDenied,
            "INVALID_REQUEST" => GeocodeStatus::InvalidRequest,
            _ => GeocodeStatus::UnknownError,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, GeocodeStatus::Ok)
    }
}

/// Outcome of a single geocoding request.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResponse {
    pub status: GeocodeStatus,
    pub results: Vec<Coordinate>,
}

impl GeocodeResponse {
    pub fn ok(results: Vec<Coordinate>) -> Self {
        Self {
            status: GeocodeStatus::Ok,
            results,
        }
    }

    pub fn status(status: GeocodeStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
        }
    }
}

/// Address-to-coordinate lookup offered by the map library.
///
/// Each call issues exactly one request. Transport failures are reported
/// through [`GeocodeStatus::UnknownError`] rather than a separate error path.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> BoxFuture<'static, GeocodeResponse>;
}

/// The loaded map library.
///
/// A handle to this trait is only obtainable from a resolved
/// [`ScriptLoadGate`](crate::gate::ScriptLoadGate).
pub trait MapLibrary: Send + Sync {
    /// Constructs a map inside `container`.
    fn create_map(
        &self,
        container: &str,
        options: &MapOptions,
    ) -> Result<Arc<dyn MapSurface>, SurfaceError>;

    /// Returns the library's geocoder.
    fn geocoder(&self) -> Arc<dyn Geocoder>;
}
