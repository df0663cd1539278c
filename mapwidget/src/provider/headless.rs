//! In-memory map library.
//!
//! `HeadlessLibrary` stands in for a rendering engine: surfaces record their
//! options and markers instead of drawing them. The CLI uses it to report
//! the resulting map state, and tests use it to observe what the widget did.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::coord::Coordinate;
use crate::gate::{LoadRequest, ReadyResult, ScriptLoader};
use crate::provider::{
    BoxFuture, ClickHandler, GeocodeResponse, GeocodeStatus, Geocoder, MapLibrary, MapOptions,
    MapOptionsPatch, MapSurface, MarkerHandle, SurfaceError,
};

/// Mutable state of a headless surface.
#[derive(Debug, Default)]
struct SurfaceState {
    options: MapOptions,
    markers: BTreeMap<MarkerHandle, Coordinate>,
    next_marker: u64,
}

/// A map surface that records state instead of rendering.
pub struct HeadlessSurface {
    container: String,
    state: Mutex<SurfaceState>,
    click_handlers: Mutex<Vec<ClickHandler>>,
}

impl HeadlessSurface {
    pub fn new(container: impl Into<String>, options: MapOptions) -> Self {
        Self {
            container: container.into(),
            state: Mutex::new(SurfaceState {
                options,
                ..Default::default()
            }),
            click_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Current options as last applied.
    pub fn options(&self) -> MapOptions {
        self.state.lock().options
    }

    /// Positions of all markers, ordered by creation.
    pub fn marker_positions(&self) -> Vec<Coordinate> {
        self.state.lock().markers.values().copied().collect()
    }

    pub fn marker_count(&self) -> usize {
        self.state.lock().markers.len()
    }

    /// Simulates a user click at `location`.
    pub fn click(&self, location: Coordinate) {
        let handlers = self.click_handlers.lock().clone();
        for handler in handlers {
            handler(location);
        }
    }
}

impl MapSurface for HeadlessSurface {
    fn center(&self) -> Coordinate {
        self.state.lock().options.center
    }

    fn set_center(&self, center: Coordinate) {
        self.state.lock().options.center = center;
    }

    fn zoom(&self) -> i32 {
        self.state.lock().options.zoom
    }

    fn set_zoom(&self, zoom: i32) {
        self.state.lock().options.zoom = zoom;
    }

    fn set_options(&self, patch: &MapOptionsPatch) {
        self.state.lock().options.apply(patch);
    }

    fn add_marker(&self, position: Coordinate) -> MarkerHandle {
        let mut state = self.state.lock();
        state.next_marker += 1;
        let handle = MarkerHandle::new(state.next_marker);
        state.markers.insert(handle, position);
        handle
    }

    fn remove_marker(&self, handle: MarkerHandle) {
        self.state.lock().markers.remove(&handle);
    }

    fn on_click(&self, handler: ClickHandler) {
        self.click_handlers.lock().push(handler);
    }
}

/// Map library whose surfaces are [`HeadlessSurface`]s.
pub struct HeadlessLibrary {
    geocoder: Arc<dyn Geocoder>,
    surfaces: Mutex<Vec<Arc<HeadlessSurface>>>,
}

impl HeadlessLibrary {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            surfaces: Mutex::new(Vec::new()),
        }
    }

    /// Most recently created surface, if any.
    pub fn last_surface(&self) -> Option<Arc<HeadlessSurface>> {
        self.surfaces.lock().last().cloned()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.lock().len()
    }
}

impl MapLibrary for HeadlessLibrary {
    fn create_map(
        &self,
        container: &str,
        options: &MapOptions,
    ) -> Result<Arc<dyn MapSurface>, SurfaceError> {
        if container.trim().is_empty() {
            return Err(SurfaceError::ContainerNotFound(container.to_string()));
        }
        let surface = Arc::new(HeadlessSurface::new(container, *options));
        self.surfaces.lock().push(Arc::clone(&surface));
        Ok(surface)
    }

    fn geocoder(&self) -> Arc<dyn Geocoder> {
        Arc::clone(&self.geocoder)
    }
}

/// Loader that yields a shared [`HeadlessLibrary`] without any I/O.
pub struct HeadlessLoader {
    library: Arc<HeadlessLibrary>,
    preloaded: bool,
}

impl HeadlessLoader {
    pub fn new(library: Arc<HeadlessLibrary>) -> Self {
        Self {
            library,
            preloaded: false,
        }
    }

    /// Reports the library as already present, so gates skip the load.
    pub fn already_loaded(library: Arc<HeadlessLibrary>) -> Self {
        Self {
            library,
            preloaded: true,
        }
    }

    pub fn library(&self) -> Arc<HeadlessLibrary> {
        Arc::clone(&self.library)
    }
}

impl ScriptLoader for HeadlessLoader {
    fn preloaded(&self) -> Option<Arc<dyn MapLibrary>> {
        if self.preloaded {
            let library: Arc<dyn MapLibrary> = self.library.clone();
            Some(library)
        } else {
            None
        }
    }

    fn load(&self, _request: LoadRequest) -> BoxFuture<'static, ReadyResult> {
        let library: Arc<dyn MapLibrary> = self.library.clone();
        Box::pin(async move { Ok(library) })
    }
}

/// Geocoder answering from a fixed table.
///
/// Unknown addresses yield [`GeocodeStatus::ZeroResults`].
#[derive(Default)]
pub struct StaticGeocoder {
    answers: Mutex<HashMap<String, GeocodeResponse>>,
    requests: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a successful answer for `address`.
    pub fn with_result(self, address: impl Into<String>, location: Coordinate) -> Self {
        self.answers
            .lock()
            .insert(address.into(), GeocodeResponse::ok(vec![location]));
        self
    }

    /// Registers a non-OK status for `address`.
    pub fn with_status(self, address: impl Into<String>, status: GeocodeStatus) -> Self {
        self.answers
            .lock()
            .insert(address.into(), GeocodeResponse::status(status));
        self
    }

    /// Number of requests issued so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Geocoder for StaticGeocoder {
    fn geocode(&self, address: &str) -> BoxFuture<'static, GeocodeResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let response = self
            .answers
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_else(|| GeocodeResponse::status(GeocodeStatus::ZeroResults));
        Box::pin(async move { response })
    }
}
