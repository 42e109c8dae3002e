//! Dispatchers deliver a command to one logical endpoint.
//!
//! A dispatcher never executes the command itself. [`BusDispatcher`] hands
//! it to a bus destination; [`LocalDispatcher`] hands it to an in-process
//! [`CommandHandler`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use sysunit_types::{Command, CommandKind, Destination};
use thiserror::Error;

use crate::bus::{BusSender, Delivery, TransportError};

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command could not be delivered.
    #[error("failed to deliver {command} to {target}: {source}")]
    Transport {
        /// What was being sent.
        command: CommandKind,
        /// Where it was being sent.
        target: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// There is nobody to dispatch work to.
    #[error("no cluster members to dispatch {work_items} work item(s) to")]
    EmptyCluster {
        /// Number of work items that could not be assigned.
        work_items: usize,
    },

    /// A round-robin round stopped at its first failed dispatch.
    #[error(
        "dispatch round aborted at node {node_name} on member {member_index} of {member_count} \
         after {dispatched} successful dispatch(es): {source}"
    )]
    Aborted {
        /// The work item that failed.
        node_name: String,
        /// Index of the member in the round's snapshot.
        member_index: usize,
        /// Size of the round's snapshot.
        member_count: usize,
        /// Work items dispatched before the failure.
        dispatched: usize,
        /// The failure.
        #[source]
        source: Box<DispatchError>,
    },
}

/// Delivers commands to one endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Deliver `command` for execution elsewhere.
    async fn dispatch(&self, command: Command) -> Result<(), DispatchError>;
}

/// Handles commands delivered to a node.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one delivery.
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError>;
}

/// Dispatcher bound to a bus destination and an optional reply-to.
pub struct BusDispatcher<S: ?Sized> {
    bus: Arc<S>,
    destination: Destination,
    reply_to: Option<Destination>,
}

impl<S: BusSender + ?Sized> BusDispatcher<S> {
    /// Bind a destination.
    pub fn new(bus: Arc<S>, destination: Destination, reply_to: Option<Destination>) -> Self {
        Self {
            bus,
            destination,
            reply_to,
        }
    }

    /// The destination commands go to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// The reply-to attached to every command.
    pub fn reply_to(&self) -> Option<&Destination> {
        self.reply_to.as_ref()
    }
}

impl<S: ?Sized> fmt::Debug for BusDispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusDispatcher")
            .field("destination", &self.destination)
            .field("reply_to", &self.reply_to)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: BusSender + ?Sized> Dispatcher for BusDispatcher<S> {
    async fn dispatch(&self, command: Command) -> Result<(), DispatchError> {
        tracing::debug!("Dispatching {} to {}", command.kind(), self.destination);
        self.bus
            .send(&self.destination, &command, self.reply_to.as_ref())
            .await
            .map_err(|source| {
                tracing::warn!("Dispatch to {} failed: {}", self.destination, source);
                DispatchError::Transport {
                    command: command.kind(),
                    target: self.destination.to_string(),
                    source,
                }
            })
    }
}

/// Dispatcher that hands commands straight to an in-process handler.
pub struct LocalDispatcher {
    name: String,
    handler: Arc<dyn CommandHandler>,
}

impl LocalDispatcher {
    /// Wrap a handler.
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDispatcher")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, command: Command) -> Result<(), DispatchError> {
        tracing::debug!("Dispatching {} locally to {}", command.kind(), self.name);
        self.handler
            .handle(Delivery {
                command,
                reply_to: None,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusReceiver, InMemoryBus};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Command>>,
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(delivery.command);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bus_dispatcher_attaches_reply_to() {
        let bus = Arc::new(InMemoryBus::new());
        let target = bus.temporary_queue();
        let reply = bus.temporary_queue();
        let mut sub = bus.subscribe(&target).await.unwrap();

        let dispatcher = BusDispatcher::new(Arc::clone(&bus), target.clone(), Some(reply.clone()));
        dispatcher.dispatch(Command::RequestMembers).await.unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.command, Command::RequestMembers);
        assert_eq!(delivery.reply_to, Some(reply));
    }

    #[tokio::test]
    async fn bus_dispatcher_reports_unreachable_target() {
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = BusDispatcher::new(Arc::clone(&bus), bus.temporary_queue(), None);

        let err = dispatcher
            .dispatch(Command::start_test_node("s", "a"))
            .await
            .unwrap_err();

        match err {
            DispatchError::Transport {
                command, source, ..
            } => {
                assert_eq!(command, CommandKind::StartTestNode);
                assert!(matches!(source, TransportError::Unreachable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn local_dispatcher_calls_handler() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = LocalDispatcher::new("local", recorder.clone());

        dispatcher
            .dispatch(Command::start_test_node("s", "a"))
            .await
            .unwrap();

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![Command::start_test_node("s", "a")]
        );
    }

    #[test]
    fn aborted_error_names_the_failure_point() {
        let err = DispatchError::Aborted {
            node_name: "c".into(),
            member_index: 2,
            member_count: 3,
            dispatched: 2,
            source: Box::new(DispatchError::EmptyCluster { work_items: 1 }),
        };
        let text = err.to_string();
        assert!(text.contains("node c on member 2 of 3"));
        assert!(text.contains("after 2 successful"));
    }
}
