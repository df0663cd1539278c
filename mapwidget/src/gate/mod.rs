//! One-time asynchronous load of the external map library.
//!
//! Every operation that touches the map library waits behind a
//! [`ScriptLoadGate`]. The first call to [`ScriptLoadGate::ready`] starts the
//! load; every later call shares the same future, so the library is fetched
//! at most once per gate no matter how many operations are queued.
//!
//! # State Machine
//!
//! ```text
//! Unloaded --[first ready()]--> Loading --[library signals ready]--> Loaded
//!                                  └------[load error]-------------> Failed
//! ```
//!
//! A gate constructed while the library is already present starts in
//! `Loaded`. `Failed` is terminal: the load is never retried.
//!
//! # Completion Signal
//!
//! Each gate hands its loader a unique callback token in the
//! [`LoadRequest`]. Loaders resolve the future they return instead of
//! writing to any shared slot, so several gates can load side by side.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::provider::{BoxFuture, MapLibrary};

/// Prefix for per-gate callback tokens.
pub const CALLBACK_PREFIX: &str = "__mapwidget_ready_";

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Errors produced while loading the map library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The load request could not be built.
    #[error("Invalid load request: {0}")]
    InvalidRequest(String),

    /// The library failed to load.
    #[error("Map library failed to load: {0}")]
    Load(String),
}

/// Result every waiter on the gate observes.
pub type ReadyResult = Result<Arc<dyn MapLibrary>, GateError>;

/// Shared future returned by [`ScriptLoadGate::ready`].
pub type ReadyFuture = Shared<BoxFuture<'static, ReadyResult>>;

/// Load lifecycle of the map library for one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl LoadState {
    /// Returns true once the state can no longer change.
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }
}

/// Parameters handed to a [`ScriptLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub script_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-gate completion token, unique within the process.
    pub callback: String,
}

impl LoadRequest {
    /// Creates a request with a freshly allocated callback token.
    pub fn new(script_url: Option<String>, api_key: Option<String>) -> Self {
        let id = NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            script_url,
            api_key,
            callback: format!("{}{}", CALLBACK_PREFIX, id),
        }
    }

    /// Builds the full script URL with the key and callback parameters.
    ///
    /// A missing API key is omitted from the query; a missing script URL is
    /// an error.
    pub fn url(&self) -> Result<String, GateError> {
        let base = self
            .script_url
            .as_deref()
            .ok_or_else(|| GateError::InvalidRequest("no script URL configured".to_string()))?;

        let mut params: Vec<(&str, &str)> = Vec::with_capacity(2);
        if let Some(key) = self.api_key.as_deref() {
            params.push(("key", key));
        }
        params.push(("callback", self.callback.as_str()));

        reqwest::Url::parse_with_params(base, &params)
            .map(String::from)
            .map_err(|e| GateError::InvalidRequest(format!("bad script URL '{}': {}", base, e)))
    }
}

/// Loads the external map library.
pub trait ScriptLoader: Send + Sync {
    /// Returns the library if the host already loaded it.
    fn preloaded(&self) -> Option<Arc<dyn MapLibrary>>;

    /// Starts loading the library. The returned future resolves when the
    /// library signals readiness for `request.callback`.
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, ReadyResult>;
}

/// Load state and the shared future, guarded together.
struct GateInner {
    state: LoadState,
    ready: Option<ReadyFuture>,
}

impl GateInner {
    /// Records the outcome of the load.
    fn settle(&mut self, result: &ReadyResult) {
        match result {
            Ok(_) => {
                self.state = LoadState::Loaded;
                info!("Map library loaded");
            }
            Err(e) => {
                self.state = LoadState::Failed;
                error!(error = %e, "Map library failed to load");
            }
        }
    }
}

/// One-time, idempotent readiness barrier for the map library.
///
/// # Example
///
/// ```ignore
/// use mapwidget::gate::{LoadRequest, ScriptLoadGate};
///
/// let gate = ScriptLoadGate::new(loader, LoadRequest::new(Some(url), Some(key)));
/// let library = gate.ready().await?;
/// let surface = library.create_map("map", &options)?;
/// ```
pub struct ScriptLoadGate {
    loader: Arc<dyn ScriptLoader>,
    request: LoadRequest,
    inner: Arc<Mutex<GateInner>>,
}

impl fmt::Debug for ScriptLoadGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLoadGate")
            .field("request", &self.request)
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}

impl ScriptLoadGate {
    /// Creates a gate. If the loader reports the library as already present,
    /// the gate starts `Loaded` and never issues a load.
    pub fn new(loader: Arc<dyn ScriptLoader>, request: LoadRequest) -> Self {
        let (state, ready) = match loader.preloaded() {
            Some(library) => {
                debug!("Map library already present, skipping script load");
                let resolved: BoxFuture<'static, ReadyResult> =
                    Box::pin(futures::future::ready(Ok(library)));
                (LoadState::Loaded, Some(resolved.shared()))
            }
            None => (LoadState::Unloaded, None),
        };

        Self {
            loader,
            request,
            inner: Arc::new(Mutex::new(GateInner { state, ready })),
        }
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.inner.lock().state
    }

    /// The request this gate loads with.
    pub fn request(&self) -> &LoadRequest {
        &self.request
    }

    /// Returns the shared readiness future, starting the load on first call.
    pub fn ready(&self) -> ReadyFuture {
        let mut inner = self.inner.lock();
        if let Some(ready) = inner.ready.as_ref() {
            return ready.clone();
        }

        inner.state = LoadState::Loading;
        info!(callback = %self.request.callback, "Loading map library");

        let load = self.loader.load(self.request.clone());
        // The future lives inside `inner`, so it must not keep it alive
        let tracked_inner: Weak<Mutex<GateInner>> = Arc::downgrade(&self.inner);
        let tracked: BoxFuture<'static, ReadyResult> = Box::pin(async move {
            let result = load.await;
            if let Some(inner) = tracked_inner.upgrade() {
                inner.lock().settle(&result);
            }
            result
        });

        let shared = tracked.shared();
        inner.ready = Some(shared.clone());
        shared
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::{HeadlessLibrary, StaticGeocoder};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Loader that counts load calls and resolves once released.
    pub struct CountingLoader {
        pub loads: AtomicUsize,
        pub release: Arc<Notify>,
        pub fail: bool,
        pub hold: bool,
    }

    impl CountingLoader {
        pub fn immediate() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                release: Arc::new(Notify::new()),
                fail: false,
                hold: false,
            }
        }

        pub fn held() -> Self {
            Self {
                hold: true,
                ..Self::immediate()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::immediate()
            }
        }
    }

    impl ScriptLoader for CountingLoader {
        fn preloaded(&self) -> Option<Arc<dyn MapLibrary>> {
            None
        }

        fn load(&self, request: LoadRequest) -> BoxFuture<'static, ReadyResult> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let release = Arc::clone(&self.release);
            let hold = self.hold;
            let fail = self.fail;
            Box::pin(async move {
                if hold {
                    release.notified().await;
                }
                if fail {
                    Err(GateError::Load(format!("{} never fired", request.callback)))
                } else {
                    let library: Arc<dyn MapLibrary> =
                        Arc::new(HeadlessLibrary::new(Arc::new(StaticGeocoder::new())));
                    Ok(library)
                }
            })
        }
    }

    struct PreloadedLoader;

    impl ScriptLoader for PreloadedLoader {
        fn preloaded(&self) -> Option<Arc<dyn MapLibrary>> {
            Some(Arc::new(HeadlessLibrary::new(Arc::new(StaticGeocoder::new()))))
        }

        fn load(&self, _request: LoadRequest) -> BoxFuture<'static, ReadyResult> {
            panic!("preloaded library must not be loaded again");
        }
    }

    fn request() -> LoadRequest {
        LoadRequest::new(
            Some("https://maps.example.com/api/js".to_string()),
            Some("k".to_string()),
        )
    }

    #[test]
    fn test_initial_state_unloaded() {
        let gate = ScriptLoadGate::new(Arc::new(CountingLoader::immediate()), request());
        assert_eq!(gate.state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_concurrent_ready_loads_once() {
        let loader = Arc::new(CountingLoader::held());
        let gate = ScriptLoadGate::new(loader.clone(), request());

        let waiters: Vec<_> = (0..8).map(|_| gate.ready()).collect();
        assert_eq!(gate.state(), LoadState::Loading);

        loader.release.notify_one();
        let results = futures::future::join_all(waiters).await;

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(gate.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_state_moves_through_loading_to_loaded() {
        let loader = Arc::new(CountingLoader::held());
        let gate = ScriptLoadGate::new(loader.clone(), request());
        assert_eq!(gate.state(), LoadState::Unloaded);

        let ready = gate.ready();
        assert_eq!(gate.state(), LoadState::Loading);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        loader.release.notify_one();
        ready.await.unwrap();
        assert_eq!(gate.state(), LoadState::Loaded);
        assert!(format!("{:?}", gate).contains("Loaded"));
    }

    #[tokio::test]
    async fn test_ready_future_outlives_gate() {
        let loader = Arc::new(CountingLoader::held());
        let gate = ScriptLoadGate::new(loader.clone(), request());
        let ready = gate.ready();
        drop(gate);

        loader.release.notify_one();
        assert!(ready.await.is_ok());
    }

    #[tokio::test]
    async fn test_ready_after_loaded_does_not_reload() {
        let loader = Arc::new(CountingLoader::immediate());
        let gate = ScriptLoadGate::new(loader.clone(), request());

        gate.ready().await.unwrap();
        gate.ready().await.unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_permanent() {
        let loader = Arc::new(CountingLoader::failing());
        let gate = ScriptLoadGate::new(loader.clone(), request());

        let first = gate.ready().await;
        let second = gate.ready().await;

        assert!(matches!(first, Err(GateError::Load(_))));
        assert_eq!(first.err(), second.err());
        assert_eq!(gate.state(), LoadState::Failed);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preloaded_library_short_circuits() {
        let gate = ScriptLoadGate::new(Arc::new(PreloadedLoader), request());
        assert_eq!(gate.state(), LoadState::Loaded);
        assert!(gate.ready().await.is_ok());
    }

    #[test]
    fn test_callback_tokens_are_unique() {
        let a = LoadRequest::new(None, None);
        let b = LoadRequest::new(None, None);
        assert_ne!(a.callback, b.callback);
        assert!(a.callback.starts_with(CALLBACK_PREFIX));
    }

    #[test]
    fn test_request_url_includes_key_and_callback() {
        let req = request();
        let url = req.url().unwrap();
        assert!(url.starts_with("https://maps.example.com/api/js?key=k&callback="));
        assert!(url.ends_with(&req.callback));
    }

    #[test]
    fn test_request_url_without_key() {
        let req = LoadRequest::new(Some("https://maps.example.com/js".to_string()), None);
        let url = req.url().unwrap();
        assert!(!url.contains("key="));
        assert!(url.contains("callback="));
    }

    #[test]
    fn test_request_url_requires_script_url() {
        let req = LoadRequest::new(None, Some("k".to_string()));
        assert!(matches!(req.url(), Err(GateError::InvalidRequest(_))));
    }

    #[test]
    fn test_load_state_settled() {
        assert!(!LoadState::Unloaded.is_settled());
        assert!(!LoadState::Loading.is_settled());
        assert!(LoadState::Loaded.is_settled());
        assert!(LoadState::Failed.is_settled());
    }
}
