//! Local TBean manager: one thread per TBean, waited on under a watchdog.
//!
//! # Lifecycle
//!
//! ```text
//! initialize() → start_tbeans(case) → wait_for_tbeans(timeout) → (cleared)
//! ```
//!
//! The manager keeps two mappings for the current run, bean id to thread
//! handle and bean id to [`TBeanRecord`]. Both always hold the same ids. They
//! are cleared once a wait returns, whether or not the watchdog fired.
//! Clearing detaches any thread still running; it is never killed.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysunit_types::TBeanId;

use crate::case::SystemTestCase;
use crate::error::StartError;
use crate::synchronizer::{SyncHandle, Synchronizer};
use crate::tbean::TBean;
use crate::watchdog::{CompletionLatch, WatchdogError};

/// Run state of one started TBean.
#[derive(Debug)]
pub struct TBeanRecord {
    id: TBeanId,
    synchronizable: bool,
    has_run: AtomicBool,
}

impl TBeanRecord {
    fn new(id: TBeanId, synchronizable: bool) -> Self {
        Self {
            id,
            synchronizable,
            has_run: AtomicBool::new(false),
        }
    }

    /// The TBean id.
    pub fn id(&self) -> &TBeanId {
        &self.id
    }

    /// Whether the TBean was registered with the synchronizer.
    pub fn is_synchronizable(&self) -> bool {
        self.synchronizable
    }

    /// Whether the TBean's work completed successfully.
    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.has_run.store(true, Ordering::Release);
    }
}

/// Starts the TBeans of a [`SystemTestCase`] and waits for them.
#[derive(Debug)]
pub struct TBeanManager {
    synchronizer: Arc<Synchronizer>,
    threads: BTreeMap<TBeanId, JoinHandle<()>>,
    tbeans: BTreeMap<TBeanId, Arc<TBeanRecord>>,
    latch: Arc<CompletionLatch>,
}

impl Default for TBeanManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TBeanManager {
    /// Create a manager with its own synchronizer.
    pub fn new() -> Self {
        Self::with_synchronizer(Arc::new(Synchronizer::new()))
    }

    /// Create a manager that registers TBeans with a shared synchronizer.
    pub fn with_synchronizer(synchronizer: Arc<Synchronizer>) -> Self {
        Self {
            synchronizer,
            threads: BTreeMap::new(),
            tbeans: BTreeMap::new(),
            latch: Arc::new(CompletionLatch::new()),
        }
    }

    /// Forget the current run. Running threads are detached, not stopped.
    pub fn initialize(&mut self) {
        self.threads.clear();
        self.tbeans.clear();
        // Detached threads still finish against the old latch.
        self.latch = Arc::new(CompletionLatch::new());
    }

    /// The synchronizer TBeans are registered with.
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// Replace the synchronizer used for subsequent starts.
    pub fn set_synchronizer(&mut self, synchronizer: Arc<Synchronizer>) {
        self.synchronizer = synchronizer;
    }

    /// Thread handles of the current run, by TBean id.
    pub fn tbean_threads(&self) -> &BTreeMap<TBeanId, JoinHandle<()>> {
        &self.threads
    }

    /// Records of the current run, by TBean id.
    pub fn tbeans(&self) -> &BTreeMap<TBeanId, Arc<TBeanRecord>> {
        &self.tbeans
    }

    /// Whether `id` has run, or `None` if it is not part of the current run.
    pub fn has_run(&self, id: &str) -> Option<bool> {
        self.tbeans
            .get(&TBeanId::new(id))
            .map(|record| record.has_run())
    }

    /// Instantiate every TBean of `case` and start each on its own thread.
    ///
    /// Synchronizable TBeans are registered with the synchronizer before
    /// their thread starts. On error, TBeans already started keep running.
    /// Starting an id that is already part of the current run fails with
    /// [`StartError::AlreadyRunning`].
    pub fn start_tbeans(&mut self, case: &SystemTestCase) -> Result<(), StartError> {
        tracing::info!("Starting {} tbean(s) for case {}", case.len(), case.name());

        for (id, factory) in case.tbean_factories() {
            let tbean = factory
                .create()
                .map_err(|source| StartError::Instantiate {
                    id: id.clone(),
                    source,
                })?;
            self.start_tbean(id.clone(), tbean)?;
        }

        debug_assert!(self.threads.keys().eq(self.tbeans.keys()));
        Ok(())
    }

    fn start_tbean(&mut self, id: TBeanId, mut tbean: Box<dyn TBean>) -> Result<(), StartError> {
        // The latch tracks ids, so one id can only run once per run.
        if self.tbeans.contains_key(&id) {
            return Err(StartError::AlreadyRunning { id });
        }

        let synchronizable = match tbean.as_synchronizable() {
            Some(sync) => {
                self.synchronizer.register(&id);
                sync.set_sync_handle(SyncHandle::new(Arc::clone(&self.synchronizer), id.clone()));
                true
            }
            None => false,
        };

        let record = Arc::new(TBeanRecord::new(id.clone(), synchronizable));
        self.latch.arm(&id);

        let spawned = thread::Builder::new().name(format!("tbean-{}", id)).spawn({
            let record = Arc::clone(&record);
            let latch = Arc::clone(&self.latch);
            move || run_tbean(tbean, &record, &latch)
        });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                self.latch.disarm(&id);
                return Err(StartError::Spawn { id, source });
            }
        };

        self.threads.insert(id.clone(), handle);
        self.tbeans.insert(id, record);
        Ok(())
    }

    /// Block until the started TBeans finish.
    ///
    /// A zero `timeout` joins every thread and waits indefinitely. Otherwise
    /// waits at most `timeout` from this call and, if any TBean has not
    /// finished by then, returns a [`WatchdogError`] naming them.
    ///
    /// Either way the current run is cleared afterwards.
    pub fn wait_for_tbeans(&mut self, timeout: Duration) -> Result<(), WatchdogError> {
        let start = Instant::now();

        let result = if timeout.is_zero() {
            for (id, handle) in std::mem::take(&mut self.threads) {
                if handle.join().is_err() {
                    tracing::warn!("Thread for tbean {} panicked outside its work", id);
                }
            }
            Ok(())
        } else {
            self.latch
                .wait(timeout)
                .map_err(|pending| WatchdogError::new(timeout, pending))
        };

        match &result {
            Ok(()) => tracing::info!("All tbeans finished in {:?}", start.elapsed()),
            Err(e) => tracing::warn!("{}", e),
        }

        self.initialize();
        result
    }
}

fn run_tbean(mut tbean: Box<dyn TBean>, record: &TBeanRecord, latch: &CompletionLatch) {
    let id = record.id();
    tracing::debug!("Tbean {} running", id);

    match panic::catch_unwind(AssertUnwindSafe(|| tbean.run())) {
        Ok(Ok(())) => {
            record.mark_run();
            latch.finish(id);
            tracing::debug!("Tbean {} finished", id);
        }
        Ok(Err(e)) => tracing::error!("Tbean {} failed: {}", id, e),
        Err(_) => tracing::error!("Tbean {} panicked", id),
    }
}
