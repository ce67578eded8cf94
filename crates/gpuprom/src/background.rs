//! Background processing: startup refresh and the periodic tick loop.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use gpuprom_core::collector::{Collector, CommandRunner, FileSystem, SourceError};
use gpuprom_core::model::Snapshot;

use crate::state::{SharedCollector, SharedState};

/// Runs one refresh cycle and publishes the result.
///
/// Blocking: runs external commands. Call from `spawn_blocking`.
pub(crate) fn refresh_once<F, R>(
    collector: &SharedCollector<Collector<F, R>>,
    state: &SharedState,
) -> Result<Arc<Snapshot>, SourceError>
where
    F: FileSystem + Clone,
    R: CommandRunner + Clone,
{
    let mut collector = collector.lock().unwrap_or_else(PoisonError::into_inner);
    let snapshot = collector.refresh(&state.store)?;
    if let Some(timing) = collector.last_timing() {
        debug!(
            source_ms = timing.source.as_millis() as u64,
            enrich_ms = timing.enrich.as_millis() as u64,
            total_ms = timing.total.as_millis() as u64,
            cached_processes = collector.process_cache().len(),
            "refresh timing"
        );
    }
    Ok(snapshot)
}

// ============================================================
// Tick loop
// ============================================================

/// Refreshes the published snapshot every `interval`.
///
/// The first tick fires one interval from now; the startup refresh already
/// published a snapshot. Failed cycles keep the previous snapshot.
pub(crate) async fn tick_loop<F, R>(
    collector: SharedCollector<Collector<F, R>>,
    state: SharedState,
    interval: Duration,
) where
    F: FileSystem + Clone + 'static,
    R: CommandRunner + Clone + 'static,
{
    let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut snapshot_count: u64 = 0;

    loop {
        tick.tick().await;

        let collector_clone = Arc::clone(&collector);
        let state_clone = Arc::clone(&state);
        let t0 = Instant::now();
        let result =
            tokio::task::spawn_blocking(move || refresh_once(&collector_clone, &state_clone)).await;

        let elapsed = t0.elapsed();

        match result {
            Ok(Ok(snapshot)) => {
                snapshot_count += 1;
                debug!(
                    duration_ms = elapsed.as_millis() as u64,
                    timestamp = snapshot.timestamp,
                    gpus = snapshot.gpus.len(),
                    snapshot_count,
                    "tick completed"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "refresh failed, keeping previous snapshot"
                );
            }
            Err(e) => {
                error!(error = %e, "tick panicked in spawn_blocking");
                continue;
            }
        }

        if elapsed > interval / 2 {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "tick exceeded 50% of interval"
            );
        }
    }
}

/// Logs the outcome of the startup refresh.
pub(crate) fn log_first_snapshot(snapshot: &Snapshot, elapsed: Duration) {
    info!(
        duration_ms = elapsed.as_millis() as u64,
        timestamp = snapshot.timestamp,
        gpus = snapshot.gpus.len(),
        processes = snapshot.processes.len(),
        driver = %snapshot.driver_version,
        "first snapshot collected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use gpuprom_core::collector::mock::NVIDIA_SMI;
    use gpuprom_core::collector::{MockFs, MockRunner, SmiSource};
    use std::sync::Mutex;

    fn mock_collector(runner: MockRunner) -> SharedCollector<Collector<MockFs, MockRunner>> {
        Arc::new(Mutex::new(
            Collector::new(MockFs::gpu_host(), runner, SmiSource::command(NVIDIA_SMI))
                .with_lspci(None),
        ))
    }

    #[test]
    fn test_refresh_once_publishes() {
        let collector = mock_collector(MockRunner::gpu_host());
        let state = AppState::shared();

        let snapshot = refresh_once(&collector, &state).unwrap();
        assert_eq!(snapshot.gpus.len(), 2);
        assert!(Arc::ptr_eq(&state.store.current().unwrap(), &snapshot));
    }

    #[test]
    fn test_failed_startup_refresh_leaves_store_empty() {
        let collector = mock_collector(MockRunner::new());
        let state = AppState::shared();

        assert!(refresh_once(&collector, &state).is_err());
        assert!(state.store.current().is_none());
    }

    #[tokio::test]
    async fn test_tick_loop_publishes_snapshots() {
        let runner = MockRunner::gpu_host();
        let collector = mock_collector(runner.clone());
        let state = AppState::shared();

        let handle = tokio::spawn(tick_loop(
            Arc::clone(&collector),
            Arc::clone(&state),
            Duration::from_millis(10),
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.call_count(NVIDIA_SMI) < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();

        assert!(runner.call_count(NVIDIA_SMI) >= 2);
        assert_eq!(state.store.current().unwrap().gpus.len(), 2);
        // Process facts survive across ticks.
        assert_eq!(runner.call_count("docker"), 1);
    }
}
