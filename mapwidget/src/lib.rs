//! MapWidget - declarative map widget controller
//!
//! This library binds a small set of declarative properties (address,
//! coordinates, zoom, UI flags and a marker list) to an asynchronously loaded
//! map provider. Everything that touches the provider waits behind a single
//! [`gate::ScriptLoadGate`]; the marker list is kept in sync by the
//! [`markers::MarkerReconciler`].
//!
//! # Architecture
//!
//! ```text
//! property writes ──► MapWidget (batched flush)
//!                         │
//!                         ├──► MapViewController ──► MapSurface
//!                         ├──► GeocodeAdapter ─────► Geocoder
//!                         └──► MarkerReconciler ◄─── ObservableMarkers (splices)
//!                                   │
//!                         all await ScriptLoadGate ──► ScriptLoader
//! ```

pub mod config;
pub mod coord;
pub mod gate;
pub mod geocode;
pub mod logging;
pub mod markers;
pub mod provider;
pub mod view;
pub mod widget;

pub use coord::Coordinate;
pub use widget::{MapState, MapWidget, WidgetConfig};
