//! Behaviour shared by master and slave nodes.
//!
//! Every node is bound to a group destination (a topic shared with its peers)
//! and owns a private reply-to queue. A node's listener drains both and hands
//! each delivery to the node's [`CommandHandler`].

use std::sync::Arc;
use sysunit_types::Destination;
use tokio::task::JoinHandle;

use crate::bus::{MessageBus, TransportError};
use crate::dispatcher::{BusDispatcher, CommandHandler};

/// A node's view of the bus: its group and its private reply-to queue.
pub struct Node<B> {
    bus: Arc<B>,
    group: Destination,
    reply_to: Destination,
}

impl<B: MessageBus + 'static> Node<B> {
    /// Bind a node to `group`, allocating a fresh reply-to queue.
    pub fn new(bus: Arc<B>, group: Destination) -> Self {
        let reply_to = bus.temporary_queue();
        Self {
            bus,
            group,
            reply_to,
        }
    }

    /// The bus this node talks over.
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// The node's group destination.
    pub fn group(&self) -> &Destination {
        &self.group
    }

    /// The node's private reply-to destination.
    pub fn reply_to(&self) -> &Destination {
        &self.reply_to
    }

    /// A dispatcher to `destination` that asks for replies on this node's queue.
    pub fn dispatcher_to(&self, destination: Destination) -> BusDispatcher<B> {
        BusDispatcher::new(
            Arc::clone(&self.bus),
            destination,
            Some(self.reply_to.clone()),
        )
    }

    /// Subscribe to the group and reply-to destinations and feed every
    /// delivery to `handler` on a background task.
    pub async fn listen(
        &self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Listener, TransportError> {
        let mut group = self.bus.subscribe(&self.group).await?;
        let mut direct = self.bus.subscribe(&self.reply_to).await?;
        let reply_to = self.reply_to.clone();

        let task = tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    delivery = group.recv() => delivery,
                    delivery = direct.recv() => delivery,
                };
                let Some(delivery) = delivery else {
                    tracing::debug!("Bus closed for node {}", reply_to);
                    break;
                };

                let kind = delivery.command.kind();
                if let Err(e) = handler.handle(delivery).await {
                    tracing::warn!("Node {} failed to handle {}: {}", reply_to, kind, e);
                }
            }
        });

        Ok(Listener { task })
    }
}

/// Background receive loop of a node. Stops when dropped.
#[derive(Debug)]
pub struct Listener {
    task: JoinHandle<()>,
}

impl Listener {
    /// Whether the loop is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusSender, Delivery, InMemoryBus};
    use crate::dispatcher::{DispatchError, Dispatcher};
    use async_trait::async_trait;
    use std::time::Duration;
    use sysunit_types::Command;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Delivery>);

    #[async_trait]
    impl CommandHandler for Forward {
        async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
            let _ = self.0.send(delivery);
            Ok(())
        }
    }

    #[tokio::test]
    async fn listener_receives_group_and_direct_messages() {
        let bus = Arc::new(InMemoryBus::new());
        let node = Node::new(Arc::clone(&bus), bus.destination("GROUP"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = node.listen(Arc::new(Forward(tx))).await.unwrap();
        assert!(listener.is_running());

        bus.send(node.group(), &Command::RequestMembers, None)
            .await
            .unwrap();
        bus.send(node.reply_to(), &Command::start_test_node("s", "a"), None)
            .await
            .unwrap();

        let mut commands = vec![
            rx.recv().await.unwrap().command,
            rx.recv().await.unwrap().command,
        ];
        commands.sort_by_key(|c| format!("{:?}", c));
        assert_eq!(
            commands,
            vec![Command::RequestMembers, Command::start_test_node("s", "a")]
        );
    }

    #[tokio::test]
    async fn dropped_listener_stops_receiving() {
        let bus = Arc::new(InMemoryBus::new());
        let node = Node::new(Arc::clone(&bus), bus.destination("GROUP"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = node.listen(Arc::new(Forward(tx))).await.unwrap();

        drop(listener);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let dispatcher = node.dispatcher_to(node.reply_to().clone());
        let result = dispatcher.dispatch(Command::RequestMembers).await;
        assert!(matches!(result, Err(DispatchError::Transport { .. })));
    }
}
