//! Observable marker list.
//!
//! The widget never owns the caller's marker list; it observes it through
//! [`ObservableMarkers`]. Every in-place mutation is reported as an ordered
//! sequence of [`Splice`] records, and a [`Subscription`] stops delivery when
//! disposed (or dropped).
//!
//! [`MarkerList`] is the shipped implementation: a cheaply clonable shared
//! list whose clones all refer to the same underlying storage.
//!
//! Each mutation bumps the list version and is delivered as a
//! [`SpliceBatch`] stamped with it. Batches reach subscribers strictly in
//! version order: mutations are queued under the items lock and one thread
//! at a time drains the queue. A mutation made from inside a callback is
//! delivered after the current batch, not in the middle of it.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;

/// One entry of the caller-supplied marker list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalMarker {
    pub latitude: f64,
    pub longitude: f64,
}

impl LogicalMarker {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl From<Coordinate> for LogicalMarker {
    fn from(c: Coordinate) -> Self {
        Self::new(c.latitude(), c.longitude())
    }
}

/// A single contiguous change to an observed list.
///
/// `removed` were taken out starting at `index`, then `added_count` new
/// entries were inserted at `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pub index: usize,
    pub removed: Vec<LogicalMarker>,
    pub added_count: usize,
}

/// The splices of one mutation and the list version it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceBatch {
    pub version: u64,
    pub splices: Vec<Splice>,
}

/// Receives every mutation batch, in version order.
pub type SpliceCallback = Arc<dyn Fn(&SpliceBatch) + Send + Sync>;

/// A live registration for mutation notifications.
pub trait Subscription: Send {
    /// Stops delivery. Equivalent to dropping the subscription.
    fn dispose(self: Box<Self>);
}

/// Read access to a marker list plus mutation notifications.
pub trait ObservableMarkers: Send + Sync {
    /// Current entries together with the version of the last mutation they
    /// include. Both are read atomically.
    fn versioned_snapshot(&self) -> (u64, Vec<LogicalMarker>);

    /// Current entries in order.
    fn snapshot(&self) -> Vec<LogicalMarker> {
        self.versioned_snapshot().1
    }

    fn get(&self, index: usize) -> Option<LogicalMarker>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `callback` for every later in-place mutation.
    fn subscribe(&self, callback: SpliceCallback) -> Box<dyn Subscription>;

    /// Identity of the underlying list.
    ///
    /// Two handles observing the same storage return the same value, so a
    /// list wrapped again is still recognized.
    fn list_id(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

struct ListState {
    items: Vec<LogicalMarker>,
    version: u64,
}

struct ListInner {
    state: Mutex<ListState>,
    /// Batches not yet delivered, oldest first.
    outbox: Mutex<VecDeque<SpliceBatch>>,
    /// Held by the thread draining `outbox`.
    delivery: Mutex<()>,
    subscribers: Mutex<BTreeMap<u64, SpliceCallback>>,
    next_subscriber: AtomicU64,
}

impl ListInner {
    /// Delivers queued batches unless another thread already is.
    fn deliver(&self) {
        loop {
            let Some(delivering) = self.delivery.try_lock() else {
                return;
            };
            loop {
                // Callbacks may mutate the list, so the outbox is not held
                let next = self.outbox.lock().pop_front();
                let Some(batch) = next else {
                    break;
                };
                let subscribers: Vec<SpliceCallback> =
                    self.subscribers.lock().values().cloned().collect();
                for callback in subscribers {
                    callback(&batch);
                }
            }
            drop(delivering);

            // A batch queued while we were releasing would otherwise wait
            if self.outbox.lock().is_empty() {
                return;
            }
        }
    }
}

/// Shared, observable list of markers.
///
/// Clones share storage; [`MarkerList::same_list`] tells whether two
/// handles refer to the same list.
#[derive(Clone)]
pub struct MarkerList {
    inner: Arc<ListInner>,
}

impl fmt::Debug for MarkerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerList")
            .field("items", &self.inner.state.lock().items)
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

impl Default for MarkerList {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerList {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<LogicalMarker>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                state: Mutex::new(ListState { items, version: 0 }),
                outbox: Mutex::new(VecDeque::new()),
                delivery: Mutex::new(()),
                subscribers: Mutex::new(BTreeMap::new()),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    /// Returns true if both handles refer to the same list.
    pub fn same_list(&self, other: &MarkerList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Version of the last mutation.
    pub fn version(&self) -> u64 {
        self.inner.state.lock().version
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn push(&self, marker: LogicalMarker) {
        self.batch(|batch| {
            let end = batch.len();
            batch.splice(end, 0, vec![marker]);
        });
    }

    pub fn insert(&self, index: usize, marker: LogicalMarker) {
        self.batch(|batch| {
            batch.splice(index, 0, vec![marker]);
        });
    }

    /// Removes the entry at `index`, if any.
    pub fn remove(&self, index: usize) -> Option<LogicalMarker> {
        let mut removed = Vec::new();
        self.batch(|batch| removed = batch.splice(index, 1, Vec::new()));
        removed.pop()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.batch(|batch| {
            let len = batch.len();
            batch.splice(0, len, Vec::new());
        });
    }

    /// Removes `delete_count` entries at `index` and inserts `items` there.
    pub fn splice(
        &self,
        index: usize,
        delete_count: usize,
        items: Vec<LogicalMarker>,
    ) -> Vec<LogicalMarker> {
        let mut removed = Vec::new();
        self.batch(|batch| removed = batch.splice(index, delete_count, items));
        removed
    }

    /// Applies several edits and notifies subscribers once with all splices.
    ///
    /// When another thread is delivering at the time, that thread delivers
    /// this batch as well and the call may return first.
    pub fn batch<F>(&self, edit: F)
    where
        F: FnOnce(&mut MarkerBatch<'_>),
    {
        {
            let mut state = self.inner.state.lock();
            let mut batch = MarkerBatch {
                items: &mut state.items,
                splices: Vec::new(),
            };
            edit(&mut batch);
            let splices = batch.splices;
            if splices.is_empty() {
                return;
            }

            // Queued under the items lock so outbox order is version order
            state.version += 1;
            self.inner.outbox.lock().push_back(SpliceBatch {
                version: state.version,
                splices,
            });
        }

        self.inner.deliver();
    }
}

impl ObservableMarkers for MarkerList {
    fn versioned_snapshot(&self) -> (u64, Vec<LogicalMarker>) {
        let state = self.inner.state.lock();
        (state.version, state.items.clone())
    }

    fn get(&self, index: usize) -> Option<LogicalMarker> {
        self.inner.state.lock().items.get(index).copied()
    }

    fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    fn subscribe(&self, callback: SpliceCallback) -> Box<dyn Subscription> {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(id, callback);
        Box::new(ListSubscription {
            id,
            list: Arc::downgrade(&self.inner),
        })
    }

    fn list_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

/// Edits recorded inside [`MarkerList::batch`].
pub struct MarkerBatch<'a> {
    items: &'a mut Vec<LogicalMarker>,
    splices: Vec<Splice>,
}

impl MarkerBatch<'_> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Same semantics as [`MarkerList::splice`]; `index` is clamped to the
    /// list length and `delete_count` to what is available.
    pub fn splice(
        &mut self,
        index: usize,
        delete_count: usize,
        items: Vec<LogicalMarker>,
    ) -> Vec<LogicalMarker> {
        let index = index.min(self.items.len());
        let end = index + delete_count.min(self.items.len() - index);
        let added_count = items.len();
        let removed: Vec<LogicalMarker> = self.items.splice(index..end, items).collect();

        if !removed.is_empty() || added_count > 0 {
            self.splices.push(Splice {
                index,
                removed: removed.clone(),
                added_count,
            });
        }
        removed
    }
}

struct ListSubscription {
    id: u64,
    list: Weak<ListInner>,
}

impl Subscription for ListSubscription {
    fn dispose(self: Box<Self>) {}
}

impl Drop for ListSubscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.subscribers.lock().remove(&self.id);
        }
    }
}
