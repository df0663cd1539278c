//! The map widget.
//!
//! [`MapWidget`] is the bound surface embedding code talks to. It owns one
//! gate, one view, one marker reconciler and one geocode adapter, and turns
//! property writes into the operations on them.
//!
//! # Batched Property Writes
//!
//! Setters only record the new value and schedule a flush. The flush task
//! yields once before draining, so a burst of writes made in the same turn
//! is applied in one pass, in this order:
//!
//! ```text
//! zoom ──► disable_default_ui ──► latitude/longitude ──► markers ──► address
//! ```
//!
//! Latitude and longitude written together become a single center update.
//! Passes are serialized; writes made while one is running land in the next.
//!
//! # Example
//!
//! ```ignore
//! use mapwidget::{MapWidget, WidgetConfig};
//!
//! let widget = MapWidget::new(WidgetConfig::from_config_file(&config), loader);
//! widget.attach("map").await?;
//! widget.set_zoom("12");
//! widget.set_address("1600 Amphitheatre Pkwy");
//! widget.flush().await;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config::ConfigFile;
use crate::coord::Coordinate;
use crate::gate::{LoadRequest, LoadState, ScriptLoadGate, ScriptLoader};
use crate::geocode::{GeocodeAdapter, GeocodeError};
use crate::markers::{MarkerReconciler, ObservableMarkers};
use crate::provider::{ClickHandler, MapOptions};
use crate::view::{MapClickEvent, MapViewController, ViewError};

/// Construction-time settings of a widget.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    pub script_url: Option<String>,
    pub api_key: Option<String>,
    /// Options the surface is created with.
    pub initial: MapOptions,
}

impl WidgetConfig {
    pub fn new(script_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            script_url,
            api_key,
            initial: MapOptions::default(),
        }
    }

    pub fn with_initial(mut self, initial: MapOptions) -> Self {
        self.initial = initial;
        self
    }

    /// Extracts the widget settings from a loaded configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let initial = MapOptions {
            center: Coordinate::new(config.map.latitude, config.map.longitude),
            zoom: config.map.zoom,
            disable_default_ui: config.map.disable_default_ui,
        };
        Self::new(
            config.provider.script_url.clone(),
            config.provider.api_key.clone(),
        )
        .with_initial(initial)
    }

    /// Names of required settings that are unset or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.script_url) {
            missing.push("provider.script_url");
        }
        if blank(&self.api_key) {
            missing.push("provider.api_key");
        }
        missing
    }
}

/// Observable state of an attached widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapState {
    pub center: Coordinate,
    pub zoom: i32,
    pub disable_default_ui: bool,
    pub markers: Vec<Coordinate>,
}

/// Property writes not yet applied.
#[derive(Default)]
struct PendingChanges {
    address: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    zoom: Option<String>,
    disable_default_ui: Option<bool>,
    markers: Option<Arc<dyn ObservableMarkers>>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.zoom.is_none()
            && self.disable_default_ui.is_none()
            && self.markers.is_none()
    }
}

struct WidgetInner {
    gate: Arc<ScriptLoadGate>,
    view: Arc<MapViewController>,
    markers: MarkerReconciler,
    geocoder: GeocodeAdapter,
    initial: MapOptions,
    pending: Mutex<PendingChanges>,
    /// Last list handed to `set_markers`.
    bound_markers: Mutex<Option<Arc<dyn ObservableMarkers>>>,
    /// Last `disable_default_ui` written, used at attach time.
    bound_disable_default_ui: Mutex<Option<bool>>,
    flush_scheduled: AtomicBool,
    apply_lock: tokio::sync::Mutex<()>,
}

/// A map widget bound to one asynchronously loaded map library.
#[derive(Clone)]
pub struct MapWidget {
    inner: Arc<WidgetInner>,
}

impl fmt::Debug for MapWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapWidget")
            .field("gate", &self.inner.gate)
            .field("initialized", &self.inner.view.is_initialized())
            .field("markers", &self.inner.markers)
            .finish_non_exhaustive()
    }
}

impl MapWidget {
    /// Creates a widget. Missing script URL or API key is logged and
    /// construction proceeds; the load will fail later if it must.
    pub fn new(config: WidgetConfig, loader: Arc<dyn ScriptLoader>) -> Self {
        for key in config.missing() {
            error!(key, "Map widget configuration value missing");
        }

        let request = LoadRequest::new(config.script_url, config.api_key);
        let gate = Arc::new(ScriptLoadGate::new(loader, request));
        let view = Arc::new(MapViewController::new(Arc::clone(&gate)));
        let markers = MarkerReconciler::new(Arc::clone(&gate), Arc::clone(&view));
        let geocoder = GeocodeAdapter::new(Arc::clone(&gate), Arc::clone(&view), markers.clone());

        Self {
            inner: Arc::new(WidgetInner {
                gate,
                view,
                markers,
                geocoder,
                initial: config.initial,
                pending: Mutex::new(PendingChanges::default()),
                bound_markers: Mutex::new(None),
                bound_disable_default_ui: Mutex::new(None),
                flush_scheduled: AtomicBool::new(false),
                apply_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Creates the map surface inside `container` once the library loaded.
    pub async fn attach(&self, container: &str) -> Result<(), ViewError> {
        let mut options = self.inner.initial;
        if let Some(disable) = *self.inner.bound_disable_default_ui.lock() {
            options.disable_default_ui = disable;
        }
        self.inner
            .view
            .initialize(container, options)
            .await
            .inspect_err(|e| error!(container, error = %e, "Map widget failed to attach"))
    }

    pub fn set_address(&self, address: impl Into<String>) {
        self.inner.pending.lock().address = Some(address.into());
        self.schedule_flush();
    }

    pub fn set_latitude(&self, latitude: impl Into<String>) {
        self.inner.pending.lock().latitude = Some(latitude.into());
        self.schedule_flush();
    }

    pub fn set_longitude(&self, longitude: impl Into<String>) {
        self.inner.pending.lock().longitude = Some(longitude.into());
        self.schedule_flush();
    }

    pub fn set_zoom(&self, zoom: impl Into<String>) {
        self.inner.pending.lock().zoom = Some(zoom.into());
        self.schedule_flush();
    }

    pub fn set_disable_default_ui(&self, disable: bool) {
        *self.inner.bound_disable_default_ui.lock() = Some(disable);
        self.inner.pending.lock().disable_default_ui = Some(disable);
        self.schedule_flush();
    }

    /// Binds a marker list. Binding the list that is already bound does
    /// nothing, even through a new handle; in-place changes reach the map
    /// through its subscription.
    pub fn set_markers(&self, list: Arc<dyn ObservableMarkers>) {
        {
            let mut bound = self.inner.bound_markers.lock();
            if let Some(current) = bound.as_ref() {
                if current.list_id() == list.list_id() {
                    debug!("Same marker list bound again, ignored");
                    return;
                }
            }
            *bound = Some(Arc::clone(&list));
        }
        self.inner.pending.lock().markers = Some(list);
        self.schedule_flush();
    }

    /// Spawns a flush task unless one is already scheduled.
    ///
    /// Outside a tokio runtime nothing is spawned and the changes stay
    /// pending until [`MapWidget::flush`] is awaited.
    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let widget = self.clone();
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    widget.flush().await;
                });
            }
            Err(_) => {
                self.inner.flush_scheduled.store(false, Ordering::SeqCst);
                debug!("No runtime, property changes stay pending");
            }
        }
    }

    /// Applies every pending property change.
    ///
    /// Completes once all operations of this pass finished, including any
    /// waiting on the library load and on [`MapWidget::attach`].
    pub async fn flush(&self) {
        let _apply = self.inner.apply_lock.lock().await;
        self.inner.flush_scheduled.store(false, Ordering::SeqCst);
        let changes = std::mem::take(&mut *self.inner.pending.lock());
        if changes.is_empty() {
            return;
        }
        self.apply(changes).await;
    }

    async fn apply(&self, changes: PendingChanges) {
        let inner = &self.inner;

        if let Some(zoom) = changes.zoom {
            log_view_result("zoom", inner.view.zoom_changed(&zoom).await);
        }
        if let Some(disable) = changes.disable_default_ui {
            log_view_result(
                "disable_default_ui",
                inner.view.disable_default_ui_changed(disable).await,
            );
        }
        if changes.latitude.is_some() || changes.longitude.is_some() {
            let result = inner
                .view
                .position_changed(changes.latitude.as_deref(), changes.longitude.as_deref())
                .await;
            log_view_result("position", result);
        }
        if let Some(list) = changes.markers {
            match inner.markers.set_logical_list(list).await {
                Ok(report) => debug!(added = report.added, "Marker list applied"),
                Err(e) => log_view_result("markers", Err(e)),
            }
        }
        if let Some(address) = changes.address {
            inner.geocoder.address_changed(&address).await;
        }
    }

    /// Geocodes `address` and reports why it failed, if it did.
    pub async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        self.inner.geocoder.geocode(address).await
    }

    /// Geocodes `address` directly, bypassing the batched path.
    pub async fn address_changed(&self, address: &str) -> Option<Coordinate> {
        self.inner.geocoder.address_changed(address).await
    }

    pub async fn latitude_changed(&self, raw: &str) -> Result<(), ViewError> {
        self.inner.view.latitude_changed(raw).await
    }

    pub async fn longitude_changed(&self, raw: &str) -> Result<(), ViewError> {
        self.inner.view.longitude_changed(raw).await
    }

    pub async fn zoom_changed(&self, raw: &str) -> Result<(), ViewError> {
        self.inner.view.zoom_changed(raw).await
    }

    /// Subscribes to `map-click` events.
    pub fn subscribe_map_click(&self) -> broadcast::Receiver<MapClickEvent> {
        self.inner.view.subscribe_clicks()
    }

    /// Registers a click handler.
    pub fn on_click(&self, handler: ClickHandler) {
        self.inner.view.on_click(handler);
    }

    /// Drops the marker subscription, rendered markers and pending writes.
    pub fn dispose(&self) {
        *self.inner.pending.lock() = PendingChanges::default();
        *self.inner.bound_markers.lock() = None;
        self.inner.markers.dispose();
    }

    /// Load state of the map library.
    pub fn state(&self) -> LoadState {
        self.inner.gate.state()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.view.is_initialized()
    }

    pub fn reconciler(&self) -> &MarkerReconciler {
        &self.inner.markers
    }

    /// Current map state; `None` before the surface exists.
    pub fn snapshot(&self) -> Option<MapState> {
        let view = &self.inner.view;
        let center = view.center()?;
        let zoom = view.zoom()?;
        Some(MapState {
            center,
            zoom,
            disable_default_ui: view.options().disable_default_ui,
            markers: self.inner.markers.rendered_positions(),
        })
    }
}

fn log_view_result(property: &'static str, result: Result<(), ViewError>) {
    match result {
        Ok(()) => {}
        Err(ViewError::Gate(e)) => error!(property, error = %e, "Map library unavailable"),
        Err(e) => warn!(property, error = %e, "Property change not applied"),
    }
}
