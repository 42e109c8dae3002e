//! # sysunit-core
//!
//! Local execution of test beans (TBeans) for SysUnit.
//!
//! A system test is a set of TBeans that run concurrently, each on its own
//! OS thread. This crate provides:
//! - [`TBean`] and [`Synchronizable`] - the units of work
//! - [`SystemTestCase`] - a named, ordered set of TBean factories
//! - [`Synchronizer`] - records the sync points each TBean reaches
//! - [`TBeanManager`] - starts a case's TBeans and waits for them under a
//!   watchdog timeout
//!
//! ## Example
//!
//! ```ignore
//! let mut case = SystemTestCase::new("ping");
//! case.add_thread("One", || { do_work(); Ok(()) })?;
//!
//! let mut manager = TBeanManager::new();
//! manager.start_tbeans(&case)?;
//! manager.wait_for_tbeans(Duration::from_secs(10))?;
//! ```
//!
//! TBean work is assumed to block, so threads are used rather than async
//! tasks. Waiting never kills a TBean; a watchdog expiry only reports which
//! ones were still running.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod case;
pub mod error;
pub mod manager;
pub mod synchronizer;
pub mod tbean;
pub mod watchdog;

pub use case::{SystemTestCase, TBeanFactory};
pub use error::{BoxError, InvalidFactory, StartError};
pub use manager::{TBeanManager, TBeanRecord};
pub use synchronizer::{SyncHandle, Synchronizer};
pub use tbean::{FnTBean, SyncFnTBean, Synchronizable, TBean};
pub use watchdog::{CompletionLatch, WatchdogError};
