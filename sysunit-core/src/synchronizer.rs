//! Cross-thread sync point recorder.
//!
//! TBeans run on independently scheduled threads. To make an interleaving
//! observable (and to force one), a TBean registers with a [`Synchronizer`]
//! and emits named sync points as it reaches them. The synchronizer keeps,
//! per TBean, the exact sequence of points it emitted.
//!
//! The synchronizer is a recorder, not a barrier. Barriers are built by TBeans
//! waiting on each other's recorded points via
//! [`Synchronizer::wait_for_sync_point`].
//!
//! # Unregistered TBeans
//!
//! `sync` from an id that never called `register` is still recorded. Some
//! TBeans emit points without going through the manager.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sysunit_types::TBeanId;

#[derive(Debug, Default)]
struct SyncState {
    registered: BTreeSet<TBeanId>,
    points: HashMap<TBeanId, Vec<String>>,
}

impl SyncState {
    fn has_point(&self, id: &TBeanId, point: &str) -> bool {
        self.points
            .get(id)
            .is_some_and(|points| points.iter().any(|p| p == point))
    }
}

/// Records the registered TBeans and the sync points each one emitted.
///
/// Safe to share between TBean threads and the controlling thread. All
/// mutation happens under one lock, so `register` and `sync` are atomic and
/// reads observe every write that happened before them.
#[derive(Debug, Default)]
pub struct Synchronizer {
    state: Mutex<SyncState>,
    changed: Condvar,
}

impl Synchronizer {
    /// Create an empty synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        // A TBean panicking mid-sync must not take the recorder down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a TBean. Registering twice is a no-op.
    pub fn register(&self, id: &TBeanId) {
        let mut state = self.state();
        if state.registered.insert(id.clone()) {
            tracing::debug!("Registered tbean {} with synchronizer", id);
        }
    }

    /// Record that `id` reached `point`.
    pub fn sync(&self, id: &TBeanId, point: &str) {
        let mut state = self.state();
        if !state.registered.contains(id) {
            tracing::debug!("Sync point {} from unregistered tbean {}", point, id);
        }
        state
            .points
            .entry(id.clone())
            .or_default()
            .push(point.to_string());
        drop(state);

        self.changed.notify_all();
    }

    /// Ids of all registered TBeans.
    pub fn registered_tbeans(&self) -> BTreeSet<TBeanId> {
        self.state().registered.clone()
    }

    /// Whether `id` has been registered.
    pub fn is_registered(&self, id: &TBeanId) -> bool {
        self.state().registered.contains(id)
    }

    /// The points `id` emitted, in emission order. Empty if none.
    pub fn sync_points(&self, id: &TBeanId) -> Vec<String> {
        self.state().points.get(id).cloned().unwrap_or_default()
    }

    /// Block until `id` has emitted `point` or `timeout` elapses.
    ///
    /// Returns whether the point was reached.
    pub fn wait_for_sync_point(&self, id: &TBeanId, point: &str, timeout: Duration) -> bool {
        let guard = self.state();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !state.has_point(id, point))
            .unwrap_or_else(PoisonError::into_inner);
        guard.has_point(id, point)
    }

    /// Forget all registrations and sync points.
    pub fn reset(&self) {
        let mut state = self.state();
        state.registered.clear();
        state.points.clear();
    }
}

/// A TBean's handle on the synchronizer it was registered with.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    synchronizer: Arc<Synchronizer>,
    id: TBeanId,
}

impl SyncHandle {
    /// Bind `id` to a synchronizer.
    pub fn new(synchronizer: Arc<Synchronizer>, id: TBeanId) -> Self {
        Self { synchronizer, id }
    }

    /// The TBean this handle emits for.
    pub fn id(&self) -> &TBeanId {
        &self.id
    }

    /// Record a sync point for this TBean.
    pub fn sync(&self, point: &str) {
        self.synchronizer.sync(&self.id, point);
    }

    /// Block until another TBean reaches `point`.
    pub fn wait_for(&self, other: &TBeanId, point: &str, timeout: Duration) -> bool {
        self.synchronizer.wait_for_sync_point(other, point, timeout)
    }

    /// The underlying synchronizer.
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn points_are_recorded_in_order() {
        let synchronizer = Synchronizer::new();
        let id = TBeanId::new("threadOne");
        synchronizer.register(&id);

        synchronizer.sync(&id, "threadOne.one");
        synchronizer.sync(&id, "threadOne.two");
        synchronizer.sync(&id, "threadOne.three");

        assert_eq!(
            synchronizer.sync_points(&id),
            vec!["threadOne.one", "threadOne.two", "threadOne.three"]
        );
    }

    #[test]
    fn register_is_idempotent() {
        let synchronizer = Synchronizer::new();
        let id = TBeanId::new("One");
        synchronizer.register(&id);
        synchronizer.register(&id);

        assert_eq!(synchronizer.registered_tbeans().len(), 1);
        assert!(synchronizer.is_registered(&id));
    }

    #[test]
    fn unknown_tbean_has_no_points() {
        let synchronizer = Synchronizer::new();
        assert!(synchronizer.sync_points(&TBeanId::new("ghost")).is_empty());
    }

    #[test]
    fn unregistered_sync_is_recorded() {
        let synchronizer = Synchronizer::new();
        let id = TBeanId::new("loose");

        synchronizer.sync(&id, "here");

        assert_eq!(synchronizer.sync_points(&id), vec!["here"]);
        assert!(!synchronizer.is_registered(&id));
    }

    #[test]
    fn concurrent_syncs_do_not_interleave_per_tbean() {
        let synchronizer = Arc::new(Synchronizer::new());
        let ids = [TBeanId::new("threadOne"), TBeanId::new("threadTwo")];

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let synchronizer = Arc::clone(&synchronizer);
                thread::spawn(move || {
                    synchronizer.register(&id);
                    for i in 0..200 {
                        synchronizer.sync(&id, &format!("{}.{}", id, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in &ids {
            let expected: Vec<String> = (0..200).map(|i| format!("{}.{}", id, i)).collect();
            assert_eq!(synchronizer.sync_points(id), expected);
        }
        assert_eq!(synchronizer.registered_tbeans().len(), 2);
    }

    #[test]
    fn wait_for_sync_point_wakes_on_sync() {
        let synchronizer = Arc::new(Synchronizer::new());
        let one = TBeanId::new("One");

        let emitter = {
            let synchronizer = Arc::clone(&synchronizer);
            let one = one.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                synchronizer.sync(&one, "ready");
            })
        };

        assert!(synchronizer.wait_for_sync_point(&one, "ready", Duration::from_secs(5)));
        emitter.join().unwrap();
    }

    #[test]
    fn wait_for_sync_point_times_out() {
        let synchronizer = Synchronizer::new();
        let start = Instant::now();

        let reached =
            synchronizer.wait_for_sync_point(&TBeanId::new("One"), "never", Duration::from_millis(100));

        assert!(!reached);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn handles_build_a_barrier() {
        let synchronizer = Arc::new(Synchronizer::new());
        let one = SyncHandle::new(Arc::clone(&synchronizer), TBeanId::new("One"));
        let two = SyncHandle::new(Arc::clone(&synchronizer), TBeanId::new("Two"));

        // Two may only finish after One has started.
        let waiter = thread::spawn(move || {
            let seen = two.wait_for(&TBeanId::new("One"), "started", Duration::from_secs(5));
            two.sync("finished");
            seen
        });
        thread::sleep(Duration::from_millis(20));
        one.sync("started");

        assert!(waiter.join().unwrap());
        assert_eq!(synchronizer.sync_points(&TBeanId::new("Two")), vec!["finished"]);
    }

    #[test]
    fn reset_clears_everything() {
        let synchronizer = Synchronizer::new();
        let id = TBeanId::new("One");
        synchronizer.register(&id);
        synchronizer.sync(&id, "a");

        synchronizer.reset();

        assert!(synchronizer.registered_tbeans().is_empty());
        assert!(synchronizer.sync_points(&id).is_empty());
    }
}
