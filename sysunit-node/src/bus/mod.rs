//! Message bus abstraction for SysUnit nodes.
//!
//! Nodes only need three things from a bus: named destinations,
//! fire-and-forget delivery, and an optional reply-to address attached to a
//! message. The bus is split into two capabilities so a node can be given
//! only what it uses:
//! - [`BusSender`] resolves destinations and sends commands
//! - [`BusReceiver`] subscribes to a destination
//!
//! [`InMemoryBus`] implements both inside one process.
//!
//! # Example
//!
//! ```ignore
//! let bus = InMemoryBus::new();
//! let slaves = bus.destination("SYSUNIT.SLAVES");
//! let mut sub = bus.subscribe(&slaves).await?;
//! bus.send(&slaves, &Command::RequestMembers, None).await?;
//! let delivery = sub.recv().await;
//! ```

mod memory;

pub use memory::{InMemoryBus, SentMessage};

use async_trait::async_trait;
use sysunit_types::{CodecError, Command, Destination};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Nothing is listening on a point-to-point destination.
    #[error("destination unreachable: {0}")]
    Unreachable(Destination),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Command could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Bus closed.
    #[error("bus closed")]
    Closed,
}

/// An encoded message as it travels over the bus.
#[derive(Debug, Clone)]
pub struct Frame {
    /// MessagePack-encoded [`Command`].
    pub payload: Vec<u8>,
    /// Where the receiver should answer, if anywhere.
    pub reply_to: Option<Destination>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The command received.
    pub command: Command,
    /// Where the sender wants answers to go.
    pub reply_to: Option<Destination>,
}

/// Inbound message stream for one destination.
#[derive(Debug)]
pub struct Subscription {
    destination: Destination,
    receiver: mpsc::UnboundedReceiver<Frame>,
}

impl Subscription {
    /// Wrap a frame receiver.
    pub fn new(destination: Destination, receiver: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self {
            destination,
            receiver,
        }
    }

    /// The destination this subscription listens on.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Receive the next decodable message, or `None` once the bus is gone.
    ///
    /// Frames that fail to decode are logged and skipped. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let frame = self.receiver.recv().await?;
            match Command::from_bytes(&frame.payload) {
                Ok(command) => {
                    return Some(Delivery {
                        command,
                        reply_to: frame.reply_to,
                    })
                }
                Err(e) => {
                    tracing::warn!("Dropping undecodable frame on {}: {}", self.destination, e)
                }
            }
        }
    }
}

/// Sending half of a message bus.
#[async_trait]
pub trait BusSender: Send + Sync {
    /// Resolve a named group destination (broadcast).
    fn destination(&self, name: &str) -> Destination;

    /// Create a unique point-to-point destination for replies.
    fn temporary_queue(&self) -> Destination;

    /// Send a command, optionally naming where replies should go.
    async fn send(
        &self,
        destination: &Destination,
        command: &Command,
        reply_to: Option<&Destination>,
    ) -> Result<(), TransportError>;
}

/// Receiving half of a message bus.
#[async_trait]
pub trait BusReceiver: Send + Sync {
    /// Start receiving messages sent to `destination`.
    async fn subscribe(&self, destination: &Destination) -> Result<Subscription, TransportError>;
}

/// A bus that can both send and receive.
pub trait MessageBus: BusSender + BusReceiver {}

impl<T: BusSender + BusReceiver> MessageBus for T {}
