//! # sysunit-node
//!
//! Distributed dispatch for SysUnit: a master discovers slaves over a
//! message bus and spreads test nodes across them round-robin.
//!
//! ## Features
//!
//! - **Bus Abstraction**: [`BusSender`] / [`BusReceiver`] with an in-process
//!   [`InMemoryBus`]
//! - **Dispatchers**: deliver a command to a bus destination or an
//!   in-process handler
//! - **Discovery**: `REQUEST_MEMBERS` / `ADD_MEMBER` within a registration window
//! - **Round-robin**: one `START_TEST_NODE` per work item, cycling members
//!
//! ## Example
//!
//! ```ignore
//! let bus = Arc::new(InMemoryBus::new());
//! let slaves = bus.destination("SYSUNIT.SLAVES");
//!
//! let mut slave = SlaveNode::new(bus.clone(), slaves.clone(), Arc::new(LoggingLauncher::new()));
//! slave.listen().await?;
//!
//! let mut master = MasterNode::new(bus.clone(), bus.destination("SYSUNIT.MASTERS"), slaves);
//! let report = master.start("fooSystemTest", &nodes).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod master;
pub mod member;
pub mod node;
pub mod slave;

pub use bus::{
    BusReceiver, BusSender, Delivery, Frame, InMemoryBus, MessageBus, SentMessage, Subscription,
    TransportError,
};
pub use config::{Config, ConfigError, MasterConfig, SlaveConfig};
pub use dispatcher::{BusDispatcher, CommandHandler, DispatchError, Dispatcher, LocalDispatcher};
pub use error::NodeError;
pub use master::{round_robin, Assignment, DispatchReport, MasterNode, DEFAULT_REGISTRATION_WINDOW};
pub use member::{Member, MemberMap};
pub use node::{Listener, Node};
pub use slave::{CaseLauncher, LaunchError, LoggingLauncher, SlaveNode, TestNodeLauncher};
