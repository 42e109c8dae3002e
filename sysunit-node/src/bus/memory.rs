//! In-process message bus.
//!
//! Routes frames between subscribers in the same process. Sent messages are
//! recorded for verification, and sends can be forced to fail.

use super::{BusReceiver, BusSender, Frame, Subscription, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sysunit_types::{Command, Destination};
use tokio::sync::mpsc;

/// A message that was accepted by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Where it was sent.
    pub destination: Destination,
    /// What was sent.
    pub command: Command,
    /// The attached reply-to, if any.
    pub reply_to: Option<Destination>,
}

/// In-process message bus.
///
/// Topics fan out to every live subscriber; zero subscribers is fine.
/// Queues deliver to one live subscriber; zero subscribers is
/// [`TransportError::Unreachable`]. Clones share the same bus.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

#[derive(Debug, Default)]
struct BusInner {
    routes: DashMap<Destination, Vec<mpsc::UnboundedSender<Frame>>>,
    log: Mutex<BusLog>,
}

#[derive(Debug, Default)]
struct BusLog {
    sent: Vec<SentMessage>,
    fail_next_send: Option<String>,
}

impl InMemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, BusLog> {
        self.inner.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All messages accepted so far, in send order.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.log().sent.clone()
    }

    /// Messages accepted for one destination, in send order.
    pub fn sent_to(&self, destination: &Destination) -> Vec<SentMessage> {
        self.log()
            .sent
            .iter()
            .filter(|m| &m.destination == destination)
            .cloned()
            .collect()
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.log().fail_next_send = Some(error.to_string());
    }

    /// Number of live subscribers on a destination.
    pub fn subscriber_count(&self, destination: &Destination) -> usize {
        self.inner
            .routes
            .get(destination)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drop closed subscribers and forget destinations left with none.
    fn prune(&self) {
        self.inner.routes.retain(|_, subscribers| {
            subscribers.retain(|tx| !tx.is_closed());
            !subscribers.is_empty()
        });
    }

    /// Clear the sent log and any forced failure.
    pub fn reset(&self) {
        *self.log() = BusLog::default();
    }
}

#[async_trait]
impl BusSender for InMemoryBus {
    fn destination(&self, name: &str) -> Destination {
        Destination::topic(name)
    }

    fn temporary_queue(&self) -> Destination {
        Destination::queue(format!("tmp.{}", uuid::Uuid::new_v4().as_simple()))
    }

    async fn send(
        &self,
        destination: &Destination,
        command: &Command,
        reply_to: Option<&Destination>,
    ) -> Result<(), TransportError> {
        if let Some(error) = self.log().fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        let frame = Frame {
            payload: command.to_bytes()?,
            reply_to: reply_to.cloned(),
        };

        let delivered = match self.inner.routes.get_mut(destination) {
            Some(mut subscribers) => {
                subscribers.retain(|tx| !tx.is_closed());
                if destination.is_topic() {
                    for tx in subscribers.iter() {
                        // A receiver dropped since retain() just misses this one.
                        let _ = tx.send(frame.clone());
                    }
                    true
                } else {
                    subscribers.iter().any(|tx| tx.send(frame.clone()).is_ok())
                }
            }
            None => false,
        };
        self.prune();

        if !delivered && !destination.is_topic() {
            return Err(TransportError::Unreachable(destination.clone()));
        }

        self.log().sent.push(SentMessage {
            destination: destination.clone(),
            command: command.clone(),
            reply_to: reply_to.cloned(),
        });
        Ok(())
    }
}

#[async_trait]
impl BusReceiver for InMemoryBus {
    async fn subscribe(&self, destination: &Destination) -> Result<Subscription, TransportError> {
        self.prune();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .routes
            .entry(destination.clone())
            .or_default()
            .push(tx);
        tracing::debug!("Subscribed to {}", destination);
        Ok(Subscription::new(destination.clone(), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysunit_types::MemberId;

    // ===========================================
    // Topic and queue delivery
    // ===========================================

    #[tokio::test]
    async fn topic_fans_out_to_all_subscribers() {
        let bus = InMemoryBus::new();
        let topic = bus.destination("SYSUNIT.SLAVES");
        let mut a = bus.subscribe(&topic).await.unwrap();
        let mut b = bus.subscribe(&topic).await.unwrap();

        bus.send(&topic, &Command::RequestMembers, None).await.unwrap();

        assert_eq!(a.recv().await.unwrap().command, Command::RequestMembers);
        assert_eq!(b.recv().await.unwrap().command, Command::RequestMembers);
    }

    #[tokio::test]
    async fn topic_without_subscribers_is_not_an_error() {
        let bus = InMemoryBus::new();
        let topic = bus.destination("SYSUNIT.SLAVES");

        bus.send(&topic, &Command::RequestMembers, None).await.unwrap();
        assert_eq!(bus.sent_to(&topic).len(), 1);
    }

    #[tokio::test]
    async fn queue_without_subscribers_is_unreachable() {
        let bus = InMemoryBus::new();
        let queue = bus.temporary_queue();

        let result = bus.send(&queue, &Command::RequestMembers, None).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert!(bus.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn dropped_subscription_makes_queue_unreachable() {
        let bus = InMemoryBus::new();
        let queue = bus.temporary_queue();
        let sub = bus.subscribe(&queue).await.unwrap();
        assert_eq!(bus.subscriber_count(&queue), 1);

        drop(sub);

        assert_eq!(bus.subscriber_count(&queue), 0);
        let result = bus.send(&queue, &Command::RequestMembers, None).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }

    #[tokio::test]
    async fn dead_queues_are_forgotten() {
        let bus = InMemoryBus::new();
        let topic = bus.destination("SYSUNIT.SLAVES");
        let _live = bus.subscribe(&topic).await.unwrap();
        for _ in 0..3 {
            let queue = bus.temporary_queue();
            drop(bus.subscribe(&queue).await.unwrap());
        }
        assert_eq!(bus.inner.routes.len(), 2);

        bus.send(&topic, &Command::RequestMembers, None)
            .await
            .unwrap();

        assert_eq!(bus.inner.routes.len(), 1);
        assert_eq!(bus.subscriber_count(&topic), 1);
    }

    #[tokio::test]
    async fn queue_delivers_to_one_subscriber() {
        let bus = InMemoryBus::new();
        let queue = bus.temporary_queue();
        let mut a = bus.subscribe(&queue).await.unwrap();
        let mut b = bus.subscribe(&queue).await.unwrap();

        bus.send(&queue, &Command::start_test_node("s", "a"), None)
            .await
            .unwrap();

        assert!(a.recv().await.is_some());
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn reply_to_travels_with_message() {
        let bus = InMemoryBus::new();
        let queue = bus.temporary_queue();
        let reply = bus.temporary_queue();
        let mut sub = bus.subscribe(&queue).await.unwrap();

        let cmd = Command::AddMember {
            member_id: MemberId::new("slave-1"),
        };
        bus.send(&queue, &cmd, Some(&reply)).await.unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.command, cmd);
        assert_eq!(delivery.reply_to, Some(reply));
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(Destination::queue("q"), rx);

        tx.send(Frame {
            payload: vec![0xc1],
            reply_to: None,
        })
        .unwrap();
        tx.send(Frame {
            payload: Command::RequestMembers.to_bytes().unwrap(),
            reply_to: None,
        })
        .unwrap();
        drop(tx);

        assert_eq!(sub.recv().await.unwrap().command, Command::RequestMembers);
        assert!(sub.recv().await.is_none());
    }

    // ===========================================
    // Error injection and bookkeeping
    // ===========================================

    #[tokio::test]
    async fn forced_send_failure() {
        let bus = InMemoryBus::new();
        let topic = bus.destination("t");
        bus.fail_next_send("broker down");

        let result = bus.send(&topic, &Command::RequestMembers, None).await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        bus.send(&topic, &Command::RequestMembers, None).await.unwrap();
    }

    #[tokio::test]
    async fn temporary_queues_are_unique() {
        let bus = InMemoryBus::new();
        let a = bus.temporary_queue();
        let b = bus.temporary_queue();
        assert_ne!(a, b);
        assert!(!a.is_topic());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let bus1 = InMemoryBus::new();
        let bus2 = bus1.clone();
        let topic = bus1.destination("t");
        let mut sub = bus2.subscribe(&topic).await.unwrap();

        bus1.send(&topic, &Command::RequestMembers, None).await.unwrap();

        assert!(sub.recv().await.is_some());
        assert_eq!(bus2.sent_messages().len(), 1);

        bus2.reset();
        assert!(bus1.sent_messages().is_empty());
    }
}
