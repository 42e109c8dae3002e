//! Named message-bus endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a destination delivers messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationKind {
    /// Broadcast to every current subscriber. Zero subscribers is not an error.
    Topic,
    /// Point-to-point. Delivery requires a live subscriber.
    Queue,
}

/// A named destination on the message bus.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    name: String,
    kind: DestinationKind,
}

impl Destination {
    /// A broadcast destination, e.g. a node group subject.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Topic,
        }
    }

    /// A point-to-point destination, e.g. a node's reply-to address.
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
        }
    }

    /// The destination name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The delivery kind.
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Whether this destination broadcasts.
    pub fn is_topic(&self) -> bool {
        self.kind == DestinationKind::Topic
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Topic => write!(f, "topic://{}", self.name),
            DestinationKind::Queue => write!(f, "queue://{}", self.name),
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Destination({})", self)
    }
}
