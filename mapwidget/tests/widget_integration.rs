//! Integration tests for the map widget.
//!
//! These tests drive a whole [`MapWidget`] against the headless map library:
//! - concurrent operations behind a single script load
//! - marker list replacement and in-place mutation
//! - geocoding success and failure
//! - center and zoom properties
//!
//! Run with: `cargo test --test widget_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use tokio::sync::Notify;

use mapwidget::gate::{LoadRequest, LoadState, ReadyResult, ScriptLoader};
use mapwidget::markers::{LogicalMarker, MarkerList, ObservableMarkers};
use mapwidget::provider::{
    BoxFuture, GeocodeStatus, HeadlessLibrary, HeadlessLoader, HeadlessSurface, MapLibrary,
    MapSurface, StaticGeocoder,
};
use mapwidget::{Coordinate, MapWidget, WidgetConfig};

// ============================================================================
// Helper Functions
// ============================================================================

const AMPHITHEATRE: &str = "1600 Amphitheatre Pkwy";

fn googleplex() -> Coordinate {
    Coordinate::new(37.422, -122.084)
}

/// Loader that counts loads and finishes only when released.
struct GatedLoader {
    library: Arc<HeadlessLibrary>,
    loads: AtomicUsize,
    release: Arc<Notify>,
}

impl GatedLoader {
    fn new(library: Arc<HeadlessLibrary>) -> Self {
        Self {
            library,
            loads: AtomicUsize::new(0),
            release: Arc::new(Notify::new()),
        }
    }
}

impl ScriptLoader for GatedLoader {
    fn preloaded(&self) -> Option<Arc<dyn MapLibrary>> {
        None
    }

    fn load(&self, _request: LoadRequest) -> BoxFuture<'static, ReadyResult> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let release = Arc::clone(&self.release);
        let library: Arc<dyn MapLibrary> = self.library.clone();
        Box::pin(async move {
            release.notified().await;
            Ok(library)
        })
    }
}

fn library() -> Arc<HeadlessLibrary> {
    let geocoder = StaticGeocoder::new()
        .with_result(AMPHITHEATRE, googleplex())
        .with_status("Atlantis", GeocodeStatus::ZeroResults);
    Arc::new(HeadlessLibrary::new(Arc::new(geocoder)))
}

fn config() -> WidgetConfig {
    WidgetConfig::new(
        Some("https://maps.example.test/js".to_string()),
        Some("test-key".to_string()),
    )
}

/// Widget attached to a fresh headless library that loads immediately.
async fn attached_widget() -> (MapWidget, Arc<HeadlessSurface>) {
    let library = library();
    let loader = Arc::new(HeadlessLoader::new(Arc::clone(&library)));
    let widget = MapWidget::new(config(), loader);
    widget.attach("map").await.unwrap();
    let surface = library.last_surface().unwrap();
    (widget, surface)
}

fn marker(lat: f64, lng: f64) -> LogicalMarker {
    LogicalMarker::new(lat, lng)
}

fn sorted(mut positions: Vec<Coordinate>) -> Vec<(f64, f64)> {
    positions.sort_by(|a, b| {
        a.latitude()
            .total_cmp(&b.latitude())
            .then(a.longitude().total_cmp(&b.longitude()))
    });
    positions
        .into_iter()
        .map(|c| (c.latitude(), c.longitude()))
        .collect()
}

async fn bind(widget: &MapWidget, list: &MarkerList) {
    let shared: Arc<dyn ObservableMarkers> = Arc::new(list.clone());
    widget.set_markers(shared);
    widget.flush().await;
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Operations queued before the load share one load and all run after it.
#[tokio::test]
async fn test_single_load_for_concurrent_operations() {
    let library = library();
    let loader = Arc::new(GatedLoader::new(Arc::clone(&library)));
    let widget = MapWidget::new(config(), Arc::clone(&loader) as Arc<dyn ScriptLoader>);

    let attach = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.attach("map").await })
    };
    let zoom = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.zoom_changed("6").await })
    };
    let latitude = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.latitude_changed("12.5").await })
    };
    let geocode = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.address_changed(AMPHITHEATRE).await })
    };

    while loader.loads.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(widget.state(), LoadState::Loading);
    loader.release.notify_one();

    attach.await.unwrap().unwrap();
    zoom.await.unwrap().unwrap();
    latitude.await.unwrap().unwrap();
    geocode.await.unwrap();

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(widget.state(), LoadState::Loaded);
    assert_eq!(library.surface_count(), 1);
    assert_eq!(widget.snapshot().unwrap().zoom, 6);
}

#[tokio::test]
async fn test_replacement_resets_rendered_markers() {
    let (widget, surface) = attached_widget().await;

    let first = MarkerList::from_vec(vec![marker(1.0, 1.0), marker(2.0, 2.0)]);
    bind(&widget, &first).await;
    assert_eq!(surface.marker_count(), 2);

    let second = MarkerList::from_vec(vec![marker(3.0, 3.0)]);
    bind(&widget, &second).await;

    assert_eq!(surface.marker_positions(), vec![Coordinate::new(3.0, 3.0)]);
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 1);

    // The old list no longer drives the map
    first.push(marker(9.0, 9.0));
    assert_eq!(surface.marker_count(), 1);
}

#[tokio::test]
async fn test_incremental_add_and_remove() {
    let (widget, surface) = attached_widget().await;
    let list = MarkerList::from_vec(vec![marker(1.0, 1.0)]);
    bind(&widget, &list).await;

    list.insert(1, marker(2.0, 2.0));
    assert_eq!(
        sorted(surface.marker_positions()),
        vec![(1.0, 1.0), (2.0, 2.0)]
    );

    list.remove(0);
    assert_eq!(surface.marker_positions(), vec![Coordinate::new(2.0, 2.0)]);
    assert_eq!(widget.reconciler().unmatched_removals(), 0);
}

#[tokio::test]
async fn test_multi_item_splice_renders_every_insert() {
    let (widget, surface) = attached_widget().await;
    let list = MarkerList::new();
    bind(&widget, &list).await;

    list.splice(0, 0, vec![marker(1.0, 1.0), marker(2.0, 2.0), marker(3.0, 3.0)]);
    assert_eq!(surface.marker_count(), 3);

    list.splice(1, 2, vec![marker(4.0, 4.0)]);
    assert_eq!(
        sorted(surface.marker_positions()),
        vec![(1.0, 1.0), (4.0, 4.0)]
    );
}

#[tokio::test]
async fn test_markers_bound_before_attach_render_after_attach() {
    let library = library();
    let loader = Arc::new(HeadlessLoader::new(Arc::clone(&library)));
    let widget = MapWidget::new(config(), loader);

    let list = MarkerList::from_vec(vec![marker(1.0, 1.0)]);
    let shared: Arc<dyn ObservableMarkers> = Arc::new(list.clone());
    widget.set_markers(shared);
    let flush = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.flush().await })
    };
    tokio::task::yield_now().await;

    // Mutations before the first render are picked up by reading the list
    list.push(marker(2.0, 2.0));

    widget.attach("map").await.unwrap();
    flush.await.unwrap();

    let surface = library.last_surface().unwrap();
    assert_eq!(
        sorted(surface.marker_positions()),
        vec![(1.0, 1.0), (2.0, 2.0)]
    );
    assert_eq!(widget.reconciler().unmatched_removals(), 0);
}

#[tokio::test]
async fn test_geocode_success_and_failure() {
    let (widget, surface) = attached_widget().await;
    let before = surface.center();

    widget.set_address("Atlantis");
    widget.flush().await;
    assert_eq!(surface.center(), before);
    assert_eq!(surface.marker_count(), 0);

    widget.set_address(AMPHITHEATRE);
    widget.flush().await;
    assert_eq!(surface.center(), googleplex());
    assert_eq!(surface.marker_positions(), vec![googleplex()]);
}

#[tokio::test]
async fn test_zoom_and_position_properties() {
    let (widget, surface) = attached_widget().await;

    widget.set_zoom("5");
    widget.set_latitude("51.5");
    widget.set_longitude("-0.12");
    widget.flush().await;

    assert_eq!(surface.zoom(), 5);
    assert_eq!(surface.center(), Coordinate::new(51.5, -0.12));

    // Invalid input leaves the map as it was
    widget.set_zoom("high");
    widget.set_latitude("north");
    widget.flush().await;
    assert_eq!(surface.zoom(), 5);
    assert_eq!(surface.center(), Coordinate::new(51.5, -0.12));
}

#[tokio::test]
async fn test_snapshot_serializes() {
    let (widget, _surface) = attached_widget().await;
    widget.set_zoom("3");
    widget.flush().await;

    let state = widget.snapshot().unwrap();
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["zoom"], 3);
    assert!(json["center"]["lat"].is_number());
    assert!(json["markers"].as_array().unwrap().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary edit sequences keep the rendered set equal to the list.
    #[test]
    fn prop_rendered_matches_list(
        ops in prop::collection::vec((0usize..4, 0usize..8, -5i32..5), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let (widget, surface) = attached_widget().await;
            let list = MarkerList::new();
            bind(&widget, &list).await;

            for (op, index, value) in ops {
                let m = marker(f64::from(value), f64::from(value));
                match op {
                    0 => list.insert(index, m),
                    1 => {
                        list.remove(index);
                    }
                    2 => {
                        list.splice(index, 2, vec![m, m]);
                    }
                    _ => list.batch(|batch| {
                        batch.splice(index, 1, vec![m]);
                        batch.splice(0, 1, Vec::new());
                    }),
                }
            }

            let expected: Vec<Coordinate> =
                list.snapshot().iter().map(LogicalMarker::coordinate).collect();
            assert_eq!(sorted(surface.marker_positions()), sorted(expected));
            assert_eq!(widget.reconciler().unmatched_removals(), 0);
        });
    }
}
