//! Commands exchanged between SysUnit nodes.
//!
//! A command only describes an operation. Dispatching one never executes it;
//! execution is the receiving node's responsibility.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CodecError, MemberId};

/// All commands a node can dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Ask every slave on a group to announce itself to the reply-to address.
    RequestMembers,
    /// A slave's answer to [`Command::RequestMembers`].
    ///
    /// The message's reply-to address is where the master should send work.
    AddMember {
        /// The announcing member.
        member_id: MemberId,
    },
    /// Start a test node running the referenced script.
    StartTestNode {
        /// Reference to the system test script to run.
        script: String,
        /// Logical name of the test node (JVM/process name).
        node_name: String,
    },
}

/// Discriminator for [`Command`], used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// [`Command::RequestMembers`]
    RequestMembers,
    /// [`Command::AddMember`]
    AddMember,
    /// [`Command::StartTestNode`]
    StartTestNode,
}

impl Command {
    /// Build a start command.
    pub fn start_test_node(script: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self::StartTestNode {
            script: script.into(),
            node_name: node_name.into(),
        }
    }

    /// The kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::RequestMembers => CommandKind::RequestMembers,
            Self::AddMember { .. } => CommandKind::AddMember,
            Self::StartTestNode { .. } => CommandKind::StartTestNode,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(CodecError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(CodecError::Deserialization)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestMembers => "REQUEST_MEMBERS",
            Self::AddMember => "ADD_MEMBER",
            Self::StartTestNode => "START_TEST_NODE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_test_node_survives_encoding() {
        let cmd = Command::start_test_node("fooSystemTest", "a");
        let restored = Command::from_bytes(&cmd.to_bytes().unwrap()).unwrap();
        assert_eq!(cmd, restored);
    }

    #[test]
    fn add_member_carries_member_id() {
        let cmd = Command::AddMember {
            member_id: MemberId::new("slave-1"),
        };
        match Command::from_bytes(&cmd.to_bytes().unwrap()).unwrap() {
            Command::AddMember { member_id } => assert_eq!(member_id.as_str(), "slave-1"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn json_uses_type_tag() {
        let json = serde_json::to_string(&Command::RequestMembers).unwrap();
        assert_eq!(json, r#"{"type":"RequestMembers"}"#);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result = Command::from_bytes(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::Deserialization(_))));
    }

    #[test]
    fn kind_display() {
        assert_eq!(Command::RequestMembers.kind().to_string(), "REQUEST_MEMBERS");
        assert_eq!(
            Command::start_test_node("s", "n").kind(),
            CommandKind::StartTestNode
        );
    }
}
