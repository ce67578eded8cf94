//! Shared application state and memory allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::{Arc, Mutex};

use gpuprom_core::collector::{Collector, RealFs, RealRunner};
use gpuprom_core::store::SnapshotStore;

/// Collector used against the real host.
pub(crate) type HostCollector = Collector<RealFs, RealRunner>;

/// Collector shared between the startup refresh and the tick loop.
///
/// Only refreshes lock it; scrapes never do.
pub(crate) type SharedCollector<C> = Arc<Mutex<C>>;

/// State visible to HTTP handlers.
#[derive(Default)]
pub(crate) struct AppState {
    pub(crate) store: SnapshotStore,
}

pub(crate) type SharedState = Arc<AppState>;

impl AppState {
    pub(crate) fn shared() -> SharedState {
        Arc::new(Self::default())
    }
}
