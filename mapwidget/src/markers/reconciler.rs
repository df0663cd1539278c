//! Marker reconciliation.
//!
//! Keeps the markers drawn on the surface in step with a caller-owned
//! [`ObservableMarkers`] list:
//!
//! - **Replacement** (`set_logical_list`): drop the old subscription, clear
//!   every rendered marker, subscribe to the new list and draw its entries
//!   once the map exists.
//! - **Mutation** (`apply_splices`): for each splice, remove one rendered
//!   marker per removed entry (first coordinate match) and draw the inserted
//!   entries read back from the list. When one notification carries several
//!   splices, later ones are undone first so each reads the entries it
//!   actually inserted.
//!
//! Splices that arrive before the initial render of the current list are
//! skipped: that render reads the list afterwards and already reflects them.
//! The render records the list version it saw, and any batch at or below
//! that version is skipped too, whichever thread delivers it.
//!
//! A batch can arrive after the list has already moved on, when a mutation
//! was made from inside another subscriber's callback. Its splices are held
//! until the batch matching the list version arrives, then all held splices
//! are applied against that snapshot.
//!
//! Removal matches by coordinate. When several markers share a coordinate,
//! any one of them may be removed; the multiset of positions is still
//! correct.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::list::{
    LogicalMarker, ObservableMarkers, Splice, SpliceBatch, SpliceCallback, Subscription,
};
use crate::coord::Coordinate;
use crate::gate::ScriptLoadGate;
use crate::provider::MarkerHandle;
use crate::view::{MapViewController, ViewError};

/// A marker currently drawn on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedMarker {
    pub handle: MarkerHandle,
    pub position: Coordinate,
}

/// Counts from one reconciliation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    /// Removed entries with no rendered marker at their coordinate.
    pub unmatched: usize,
}

impl ReconcileReport {
    fn merge(&mut self, other: ReconcileReport) {
        self.added += other.added;
        self.removed += other.removed;
        self.unmatched += other.unmatched;
    }
}

#[derive(Default)]
struct ReconcilerState {
    rendered: Vec<RenderedMarker>,
    list: Option<Arc<dyn ObservableMarkers>>,
    subscription: Option<Box<dyn Subscription>>,
    /// Bumped on every replacement or disposal.
    generation: u64,
    /// Generation whose initial render has completed.
    rendered_generation: Option<u64>,
    /// Last list version reflected in the rendered set.
    list_version: u64,
    /// Splices delivered while the list was already ahead of them.
    held: Vec<Splice>,
    /// Unmatched removals seen over the reconciler's lifetime.
    unmatched_total: usize,
}

struct ReconcilerInner {
    gate: Arc<ScriptLoadGate>,
    view: Arc<MapViewController>,
    state: Mutex<ReconcilerState>,
}

impl ReconcilerInner {
    fn render(&self, state: &mut ReconcilerState, position: Coordinate) -> bool {
        match self.view.add_marker(position) {
            Some(handle) => {
                state.rendered.push(RenderedMarker { handle, position });
                true
            }
            None => {
                warn!(%position, "Map not initialized, marker not drawn");
                false
            }
        }
    }

    fn clear(&self, state: &mut ReconcilerState) -> usize {
        let cleared = state.rendered.len();
        for marker in state.rendered.drain(..) {
            self.view.remove_marker(marker.handle);
        }
        cleared
    }

    fn apply_for(&self, generation: u64, batch: &SpliceBatch) -> ReconcileReport {
        let mut state = self.state.lock();
        if state.generation != generation {
            trace!(generation, "Splices from a replaced list ignored");
            return ReconcileReport::default();
        }
        if state.rendered_generation != Some(generation) {
            trace!(generation, "Initial render pending, splices deferred to it");
            return ReconcileReport::default();
        }
        if batch.version <= state.list_version {
            trace!(
                version = batch.version,
                rendered = state.list_version,
                "Splices already reflected in the rendered set"
            );
            return ReconcileReport::default();
        }
        let Some(list) = state.list.clone() else {
            return ReconcileReport::default();
        };

        state.list_version = batch.version;
        state.held.extend(batch.splices.iter().cloned());
        let (current, items) = list.versioned_snapshot();
        if current != batch.version {
            trace!(
                version = batch.version,
                current,
                "List moved on, splices held for a later batch"
            );
            return ReconcileReport::default();
        }

        let splices = std::mem::take(&mut state.held);
        self.apply(&mut state, items, &splices)
    }

    /// Applies `splices`, given the list contents after all of them.
    fn apply(
        &self,
        state: &mut ReconcilerState,
        items: Vec<LogicalMarker>,
        splices: &[Splice],
    ) -> ReconcileReport {
        let inserted = inserted_entries(items, splices);
        let mut report = ReconcileReport::default();
        for (splice, added) in splices.iter().zip(&inserted) {
            report.merge(self.apply_one(state, splice, added));
        }
        state.unmatched_total += report.unmatched;
        debug!(
            added = report.added,
            removed = report.removed,
            unmatched = report.unmatched,
            "Applied marker splices"
        );
        report
    }

    fn apply_one(
        &self,
        state: &mut ReconcilerState,
        splice: &Splice,
        added: &[LogicalMarker],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for removed in &splice.removed {
            let position = removed.coordinate();
            match state.rendered.iter().position(|r| r.position == position) {
                Some(i) => {
                    let marker = state.rendered.remove(i);
                    self.view.remove_marker(marker.handle);
                    report.removed += 1;
                }
                None => {
                    warn!(%position, "No rendered marker matches removed entry");
                    report.unmatched += 1;
                }
            }
        }

        if added.len() != splice.added_count {
            warn!(
                index = splice.index,
                expected = splice.added_count,
                found = added.len(),
                "Inserted entries missing from list"
            );
        }
        for entry in added {
            if self.render(state, entry.coordinate()) {
                report.added += 1;
            }
        }

        report
    }
}

/// Recovers the entries each splice inserted.
///
/// `current` is the list after all `splices`; undoing them last to first
/// yields the list as it was right after each one.
fn inserted_entries(
    mut current: Vec<LogicalMarker>,
    splices: &[Splice],
) -> Vec<Vec<LogicalMarker>> {
    let mut inserted = vec![Vec::new(); splices.len()];
    for (slot, splice) in inserted.iter_mut().zip(splices).rev() {
        let end = (splice.index + splice.added_count).min(current.len());
        let start = splice.index.min(end);
        *slot = current
            .splice(start..end, splice.removed.iter().copied())
            .collect();
    }
    inserted
}

/// Owner of the rendered-marker set.
#[derive(Clone)]
pub struct MarkerReconciler {
    inner: Arc<ReconcilerInner>,
}

impl fmt::Debug for MarkerReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MarkerReconciler")
            .field("rendered", &state.rendered)
            .field("generation", &state.generation)
            .field("subscribed", &state.subscription.is_some())
            .finish()
    }
}

impl MarkerReconciler {
    pub fn new(gate: Arc<ScriptLoadGate>, view: Arc<MapViewController>) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                gate,
                view,
                state: Mutex::new(ReconcilerState::default()),
            }),
        }
    }

    /// Replaces the observed list.
    ///
    /// Returns the report of the initial render. If another replacement
    /// starts before this one renders, this call returns an empty report and
    /// leaves the newer list in charge.
    pub async fn set_logical_list(
        &self,
        list: Arc<dyn ObservableMarkers>,
    ) -> Result<ReconcileReport, ViewError> {
        let generation = {
            let mut state = self.inner.state.lock();
            if let Some(subscription) = state.subscription.take() {
                subscription.dispose();
                let cleared = self.inner.clear(&mut state);
                debug!(cleared, "Marker list replaced, rendered markers cleared");
            }

            state.generation += 1;
            state.rendered_generation = None;
            state.list_version = 0;
            state.held.clear();
            state.list = Some(Arc::clone(&list));

            let generation = state.generation;
            let weak: Weak<ReconcilerInner> = Arc::downgrade(&self.inner);
            let callback: SpliceCallback = Arc::new(move |batch: &SpliceBatch| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_for(generation, batch);
                }
            });
            state.subscription = Some(list.subscribe(callback));
            generation
        };

        self.inner.gate.ready().await?;
        self.inner.view.wait_initialized().await?;

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            debug!(generation, "Marker list superseded before render");
            return Ok(ReconcileReport::default());
        }

        let (version, items) = list.versioned_snapshot();
        let mut report = ReconcileReport::default();
        for entry in items {
            if self.inner.render(&mut state, entry.coordinate()) {
                report.added += 1;
            }
        }
        state.rendered_generation = Some(generation);
        state.list_version = version;
        state.held.clear();
        debug!(rendered = report.added, version, "Marker list rendered");
        Ok(report)
    }

    /// Applies splices from the current list, read as it is now.
    ///
    /// Normally driven by the subscription; exposed for callers that observe
    /// the list themselves.
    pub fn apply_splices(&self, splices: &[Splice]) -> ReconcileReport {
        let mut state = self.inner.state.lock();
        if state.rendered_generation != Some(state.generation) {
            trace!("Initial render pending, splices deferred to it");
            return ReconcileReport::default();
        }
        let Some(list) = state.list.clone() else {
            return ReconcileReport::default();
        };
        self.inner.apply(&mut state, list.snapshot(), splices)
    }

    /// Draws a marker not backed by the list.
    pub fn add_marker(&self, position: Coordinate) -> Option<MarkerHandle> {
        let mut state = self.inner.state.lock();
        if self.inner.render(&mut state, position) {
            state.rendered.last().map(|m| m.handle)
        } else {
            None
        }
    }

    /// Unsubscribes and removes every rendered marker.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if let Some(subscription) = state.subscription.take() {
            subscription.dispose();
        }
        let cleared = self.inner.clear(&mut state);
        state.list = None;
        state.generation += 1;
        state.rendered_generation = None;
        state.held.clear();
        debug!(cleared, "Marker reconciler disposed");
    }

    /// Positions of all rendered markers.
    pub fn rendered_positions(&self) -> Vec<Coordinate> {
        self.inner
            .state
            .lock()
            .rendered
            .iter()
            .map(|m| m.position)
            .collect()
    }

    pub fn rendered(&self) -> Vec<RenderedMarker> {
        self.inner.state.lock().rendered.clone()
    }

    pub fn rendered_count(&self) -> usize {
        self.inner.state.lock().rendered.len()
    }

    /// Total removals that found no rendered marker.
    ///
    /// Valid list mutations never produce one; a non-zero value means the
    /// rendered set drifted from the list.
    pub fn unmatched_removals(&self) -> usize {
        self.inner.state.lock().unmatched_total
    }

    /// Returns true while a list subscription is active.
    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscription.is_some()
    }
}
