//! Marker list observation and reconciliation.
//!
//! - [`MarkerList`] / [`ObservableMarkers`]: the caller-owned list and the
//!   capability to observe its mutations as [`Splice`] records
//! - [`MarkerReconciler`]: keeps rendered markers in step with the list

mod list;
mod reconciler;

pub use list::{
    LogicalMarker, MarkerBatch, MarkerList, ObservableMarkers, Splice, SpliceBatch,
    SpliceCallback, Subscription,
};
pub use reconciler::{MarkerReconciler, ReconcileReport, RenderedMarker};
