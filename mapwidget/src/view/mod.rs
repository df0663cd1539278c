//! Map view controller.
//!
//! Owns the single map surface of a widget. Setters forward to the surface
//! once it exists and are silent no-ops before that. Property entry points
//! (`latitude_changed`, `longitude_changed`, `zoom_changed`) wait for the
//! gate and for initialization before applying, so writes made early are not
//! lost.
//!
//! Clicks on the surface are delivered to registered handlers and re-emitted
//! as [`MapClickEvent`]s on a broadcast channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use crate::coord::{parse_degrees, CoordError, Coordinate};
use crate::gate::{GateError, ScriptLoadGate};
use crate::provider::{
    ClickHandler, MapOptions, MapOptionsPatch, MapSurface, MarkerHandle, SurfaceError,
};

/// Name of the emitted click event.
pub const MAP_CLICK_EVENT: &str = "map-click";

/// Capacity of the click broadcast channel.
const CLICK_CHANNEL_CAPACITY: usize = 64;

/// Errors from the view controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    /// `initialize` was called more than once.
    #[error("Map view is already initialized")]
    AlreadyInitialized,

    /// Initialization failed, so the map will never exist.
    #[error("Map view failed to initialize")]
    InitializationFailed,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Coordinate(#[from] CoordError),

    /// Zoom input has no leading integer.
    #[error("Invalid zoom value: '{0}'")]
    InvalidZoom(String),
}

/// Click notification emitted to embedding code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapClickEvent {
    pub location: Coordinate,
}

impl MapClickEvent {
    pub fn name(&self) -> &'static str {
        MAP_CLICK_EVENT
    }
}

/// Initialization progress of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Pending,
    Ready,
    Failed,
}

/// Parses a zoom property with leading-integer semantics.
///
/// `"5"` → 5, `" 12px"` → 12, `"-3"` → -3, `"7.9"` → 7.
pub fn parse_zoom(raw: &str) -> Result<i32, ViewError> {
    let trimmed = raw.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(ViewError::InvalidZoom(raw.to_string()));
    }
    trimmed[..sign_len + digits]
        .parse()
        .map_err(|_| ViewError::InvalidZoom(raw.to_string()))
}

/// Bound latitude and longitude.
///
/// An axis stays unset until a property write or `initialize` fills it.
#[derive(Debug, Clone, Copy, Default)]
struct BoundPosition {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl BoundPosition {
    /// Fills only the axes nobody has written yet.
    fn seed(&mut self, center: Coordinate) {
        self.latitude.get_or_insert(center.latitude());
        self.longitude.get_or_insert(center.longitude());
    }

    fn resolve(&self, fallback: Coordinate) -> Coordinate {
        Coordinate::new(
            self.latitude.unwrap_or(fallback.latitude()),
            self.longitude.unwrap_or(fallback.longitude()),
        )
    }
}

/// Controller for the widget's map surface.
pub struct MapViewController {
    gate: Arc<ScriptLoadGate>,
    surface: Mutex<Option<Arc<dyn MapSurface>>>,
    options: Mutex<MapOptions>,
    /// Bound position, updated by the property entry points.
    position: Mutex<BoundPosition>,
    init_started: AtomicBool,
    init_state: watch::Sender<InitState>,
    click_handlers: Arc<Mutex<Vec<ClickHandler>>>,
    clicks: broadcast::Sender<MapClickEvent>,
    /// Bumped on every center-affecting property change.
    fence: AtomicU64,
}

impl MapViewController {
    pub fn new(gate: Arc<ScriptLoadGate>) -> Self {
        let (init_state, _) = watch::channel(InitState::Pending);
        let (clicks, _) = broadcast::channel(CLICK_CHANNEL_CAPACITY);
        let options = MapOptions::default();
        Self {
            gate,
            surface: Mutex::new(None),
            options: Mutex::new(options),
            position: Mutex::new(BoundPosition::default()),
            init_started: AtomicBool::new(false),
            init_state,
            click_handlers: Arc::new(Mutex::new(Vec::new())),
            clicks,
            fence: AtomicU64::new(0),
        }
    }

    /// Constructs the map surface inside `container` once the gate resolves.
    ///
    /// May only be called once per controller.
    pub async fn initialize(&self, container: &str, options: MapOptions) -> Result<(), ViewError> {
        if self.init_started.swap(true, Ordering::SeqCst) {
            return Err(ViewError::AlreadyInitialized);
        }

        match self.create_surface(container, options).await {
            Ok(()) => {
                self.init_state.send_replace(InitState::Ready);
                debug!(container, "Map view initialized");
                Ok(())
            }
            Err(e) => {
                self.init_state.send_replace(InitState::Failed);
                warn!(container, error = %e, "Map view initialization failed");
                Err(e)
            }
        }
    }

    async fn create_surface(&self, container: &str, options: MapOptions) -> Result<(), ViewError> {
        let library = self.gate.ready().await?;
        let surface = library.create_map(container, &options)?;

        let handlers = Arc::clone(&self.click_handlers);
        let clicks = self.clicks.clone();
        surface.on_click(Arc::new(move |location: Coordinate| {
            let registered = handlers.lock().clone();
            for handler in registered {
                handler(location);
            }
            // No subscribers is fine
            let _ = clicks.send(MapClickEvent { location });
        }));

        *self.options.lock() = options;
        self.position.lock().seed(options.center);
        *self.surface.lock() = Some(surface);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *self.init_state.borrow() == InitState::Ready
    }

    /// Waits until `initialize` has finished.
    pub async fn wait_initialized(&self) -> Result<(), ViewError> {
        let mut rx = self.init_state.subscribe();
        let state = match rx.wait_for(|state| *state != InitState::Pending).await {
            Ok(state) => *state,
            Err(_) => InitState::Failed,
        };
        match state {
            InitState::Ready => Ok(()),
            _ => Err(ViewError::InitializationFailed),
        }
    }

    /// Waits for the gate, then for the surface.
    async fn ready_surface(&self) -> Result<(), ViewError> {
        self.gate.ready().await?;
        self.wait_initialized().await
    }

    fn surface(&self) -> Option<Arc<dyn MapSurface>> {
        self.surface.lock().clone()
    }

    /// Moves the map center. No-op before initialization.
    pub fn set_center(&self, center: Coordinate) {
        let Some(surface) = self.surface() else {
            trace!("set_center before initialization ignored");
            return;
        };
        surface.set_center(center);
        self.options.lock().center = center;
    }

    /// Sets the zoom level as given. No-op before initialization.
    pub fn set_zoom(&self, zoom: i32) {
        let Some(surface) = self.surface() else {
            trace!("set_zoom before initialization ignored");
            return;
        };
        surface.set_zoom(zoom);
        self.options.lock().zoom = zoom;
    }

    /// Applies a partial options update. No-op before initialization.
    pub fn set_options(&self, patch: &MapOptionsPatch) {
        if patch.is_empty() {
            return;
        }
        let Some(surface) = self.surface() else {
            trace!("set_options before initialization ignored");
            return;
        };
        surface.set_options(patch);
        self.options.lock().apply(patch);
    }

    /// Current center as reported by the surface.
    pub fn center(&self) -> Option<Coordinate> {
        self.surface().map(|s| s.center())
    }

    /// Current zoom as reported by the surface.
    pub fn zoom(&self) -> Option<i32> {
        self.surface().map(|s| s.zoom())
    }

    /// Last options applied through this controller.
    pub fn options(&self) -> MapOptions {
        *self.options.lock()
    }

    /// Registers a click handler.
    pub fn on_click(&self, handler: ClickHandler) {
        self.click_handlers.lock().push(handler);
    }

    /// Subscribes to `map-click` events.
    pub fn subscribe_clicks(&self) -> broadcast::Receiver<MapClickEvent> {
        self.clicks.subscribe()
    }

    /// Draws a marker. Returns `None` before initialization.
    pub fn add_marker(&self, position: Coordinate) -> Option<MarkerHandle> {
        self.surface().map(|s| s.add_marker(position))
    }

    pub fn remove_marker(&self, handle: MarkerHandle) {
        if let Some(surface) = self.surface() {
            surface.remove_marker(handle);
        }
    }

    /// Starts a new center generation and returns its token.
    pub fn bump_fence(&self) -> u64 {
        self.fence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current center generation.
    pub fn fence(&self) -> u64 {
        self.fence.load(Ordering::SeqCst)
    }

    /// Handles a latitude property change.
    pub async fn latitude_changed(&self, raw: &str) -> Result<(), ViewError> {
        self.position_changed(Some(raw), None).await
    }

    /// Handles a longitude property change.
    pub async fn longitude_changed(&self, raw: &str) -> Result<(), ViewError> {
        self.position_changed(None, Some(raw)).await
    }

    /// Handles latitude and/or longitude changes as one center update.
    ///
    /// Both axes are parsed before anything is stored, so a bad value leaves
    /// the bound position untouched.
    pub async fn position_changed(
        &self,
        latitude: Option<&str>,
        longitude: Option<&str>,
    ) -> Result<(), ViewError> {
        let latitude = latitude.map(parse_degrees).transpose()?;
        let longitude = longitude.map(parse_degrees).transpose()?;
        {
            let mut position = self.position.lock();
            if latitude.is_some() {
                position.latitude = latitude;
            }
            if longitude.is_some() {
                position.longitude = longitude;
            }
        }
        self.bump_fence();

        self.ready_surface().await?;
        // Read after waiting so writes made meanwhile coalesce
        let center = self.position.lock().resolve(self.options().center);
        self.set_center(center);
        Ok(())
    }

    /// Handles a zoom property change.
    pub async fn zoom_changed(&self, raw: &str) -> Result<(), ViewError> {
        let zoom = parse_zoom(raw)?;
        self.ready_surface().await?;
        self.set_zoom(zoom);
        Ok(())
    }

    /// Handles a `disable_default_ui` property change.
    pub async fn disable_default_ui_changed(&self, disable: bool) -> Result<(), ViewError> {
        self.ready_surface().await?;
        self.set_options(&MapOptionsPatch {
            disable_default_ui: Some(disable),
            ..Default::default()
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::tests::CountingLoader;
    use crate::gate::LoadRequest;
    use crate::provider::{HeadlessLibrary, HeadlessLoader, StaticGeocoder, DEFAULT_CENTER};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn headless() -> (Arc<HeadlessLibrary>, MapViewController) {
        let library = Arc::new(HeadlessLibrary::new(Arc::new(StaticGeocoder::new())));
        let loader = Arc::new(HeadlessLoader::new(Arc::clone(&library)));
        let gate = Arc::new(ScriptLoadGate::new(loader, LoadRequest::new(None, None)));
        (library, MapViewController::new(gate))
    }

    async fn initialized() -> (Arc<HeadlessLibrary>, MapViewController) {
        let (library, view) = headless();
        view.initialize("map", MapOptions::default()).await.unwrap();
        (library, view)
    }

    #[test]
    fn test_parse_zoom() {
        assert_eq!(parse_zoom("5").unwrap(), 5);
        assert_eq!(parse_zoom(" 12px").unwrap(), 12);
        assert_eq!(parse_zoom("-3").unwrap(), -3);
        assert_eq!(parse_zoom("+4").unwrap(), 4);
        assert_eq!(parse_zoom("7.9").unwrap(), 7);
        assert!(matches!(parse_zoom("px"), Err(ViewError::InvalidZoom(_))));
        assert!(matches!(parse_zoom(""), Err(ViewError::InvalidZoom(_))));
        assert!(matches!(parse_zoom("-"), Err(ViewError::InvalidZoom(_))));
    }

    #[test]
    fn test_setters_before_initialize_are_noops() {
        let (library, view) = headless();
        view.set_center(Coordinate::new(1.0, 1.0));
        view.set_zoom(3);
        view.set_options(&MapOptionsPatch {
            disable_default_ui: Some(true),
            ..Default::default()
        });
        assert!(view.center().is_none());
        assert!(view.add_marker(Coordinate::new(0.0, 0.0)).is_none());
        assert_eq!(view.options(), MapOptions::default());
        assert_eq!(library.surface_count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let (library, view) = initialized().await;
        assert!(view.is_initialized());
        let second = view.initialize("map", MapOptions::default()).await;
        assert_eq!(second, Err(ViewError::AlreadyInitialized));
        assert_eq!(library.surface_count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_releases_waiters() {
        let (_library, view) = headless();
        let result = view.initialize("", MapOptions::default()).await;
        assert!(matches!(result, Err(ViewError::Surface(_))));
        assert_eq!(
            view.wait_initialized().await,
            Err(ViewError::InitializationFailed)
        );
    }

    #[tokio::test]
    async fn test_initialize_propagates_gate_failure() {
        let gate = Arc::new(ScriptLoadGate::new(
            Arc::new(CountingLoader::failing()),
            LoadRequest::new(None, None),
        ));
        let view = MapViewController::new(gate);
        let result = view.initialize("map", MapOptions::default()).await;
        assert!(matches!(result, Err(ViewError::Gate(_))));
    }

    #[tokio::test]
    async fn test_zoom_string_applies_integer() {
        let (library, view) = initialized().await;
        view.zoom_changed("5").await.unwrap();
        assert_eq!(view.zoom(), Some(5));
        assert_eq!(library.last_surface().unwrap().options().zoom, 5);
    }

    #[tokio::test]
    async fn test_zoom_is_not_clamped() {
        let (_library, view) = initialized().await;
        view.set_zoom(99);
        assert_eq!(view.zoom(), Some(99));
    }

    #[tokio::test]
    async fn test_position_changes_combine_axes() {
        let (_library, view) = initialized().await;
        view.latitude_changed("48.85").await.unwrap();
        view.longitude_changed("2.35").await.unwrap();
        assert_eq!(view.center(), Some(Coordinate::new(48.85, 2.35)));

        view.position_changed(Some("51.5"), Some("-0.12"))
            .await
            .unwrap();
        assert_eq!(view.center(), Some(Coordinate::new(51.5, -0.12)));
    }

    #[tokio::test]
    async fn test_bad_latitude_keeps_center() {
        let (_library, view) = initialized().await;
        let before = view.center();
        let result = view.position_changed(Some("north"), Some("2.0")).await;
        assert!(matches!(result, Err(ViewError::Coordinate(_))));
        assert_eq!(view.center(), before);
    }

    #[tokio::test]
    async fn test_position_change_waits_for_initialize() {
        let (_library, view) = headless();
        let view = Arc::new(view);

        let pending = {
            let view = Arc::clone(&view);
            tokio::spawn(async move { view.latitude_changed("10.0").await })
        };
        tokio::task::yield_now().await;

        view.initialize("map", MapOptions::default()).await.unwrap();
        pending.await.unwrap().unwrap();

        let center = view.center().unwrap();
        assert_eq!(center.latitude(), 10.0);
        assert_eq!(center.longitude(), DEFAULT_CENTER.longitude());
    }

    #[tokio::test]
    async fn test_initial_center_does_not_override_early_position() {
        let (library, view) = headless();
        let view = Arc::new(view);

        let pending = {
            let view = Arc::clone(&view);
            tokio::spawn(async move { view.position_changed(Some("10.5"), Some("20.25")).await })
        };
        tokio::task::yield_now().await;

        let options = MapOptions {
            center: Coordinate::new(-33.86, 151.2),
            ..MapOptions::default()
        };
        view.initialize("map", options).await.unwrap();
        pending.await.unwrap().unwrap();

        assert_eq!(view.center(), Some(Coordinate::new(10.5, 20.25)));
        assert_eq!(
            library.last_surface().unwrap().center(),
            Coordinate::new(10.5, 20.25)
        );
    }

    #[tokio::test]
    async fn test_disable_default_ui_change() {
        let (library, view) = initialized().await;
        view.disable_default_ui_changed(true).await.unwrap();
        assert!(library.last_surface().unwrap().options().disable_default_ui);
        assert!(view.options().disable_default_ui);
    }

    #[tokio::test]
    async fn test_click_reaches_handler_and_event() {
        let (library, view) = initialized().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        view.on_click(Arc::new(move |_: Coordinate| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let mut events = view.subscribe_clicks();

        let location = Coordinate::new(12.0, 34.0);
        library.last_surface().unwrap().click(location);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let event = events.recv().await.unwrap();
        assert_eq!(event.location, location);
        assert_eq!(event.name(), "map-click");
    }

    #[test]
    fn test_fence_increments() {
        let (_library, view) = headless();
        assert_eq!(view.fence(), 0);
        assert_eq!(view.bump_fence(), 1);
        assert_eq!(view.bump_fence(), 2);
        assert_eq!(view.fence(), 2);
    }

    proptest! {
        #[test]
        fn prop_center_roundtrip(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (_library, view) = runtime.block_on(initialized());
            let center = Coordinate::new(lat, lng);
            view.set_center(center);
            let read = view.center().unwrap();
            prop_assert!(read.approx_eq(&center, crate::coord::COORD_EPSILON));
        }
    }
}
