//! Map provider abstraction
//!
//! This module describes the external map library the widget drives
//! (surfaces, markers, geocoding) and ships implementations of it:
//!
//! - [`HeadlessLibrary`]: in-memory surfaces that record state
//! - [`HttpScriptLoader`] / [`GoogleGeocoder`]: Google Maps Platform over HTTP
//!
//! ```ignore
//! use mapwidget::provider::{AsyncReqwestClient, HttpScriptLoader};
//!
//! let loader = HttpScriptLoader::new(AsyncReqwestClient::new()?);
//! ```

mod google;
mod headless;
mod http;
mod types;

pub use google::{GoogleGeocoder, HttpScriptLoader, DEFAULT_SCRIPT_URL, GEOCODE_ENDPOINT};
pub use headless::{HeadlessLibrary, HeadlessLoader, HeadlessSurface, StaticGeocoder};
pub use http::{AsyncHttpClient, AsyncReqwestClient, HttpError};
pub use types::{
    BoxFuture, ClickHandler, GeocodeResponse, GeocodeStatus, Geocoder, MapLibrary, MapOptions,
    MapOptionsPatch, MapSurface, MarkerHandle, SurfaceError, DEFAULT_CENTER, DEFAULT_ZOOM,
};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
