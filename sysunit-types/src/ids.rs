//! Identity types for SysUnit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a test bean, unique within one test case.
///
/// This is the name the bean's factory was registered under.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TBeanId(String);

impl TBeanId {
    /// Create a TBeanId from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TBeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TBeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TBeanId({})", self.0)
    }
}

impl From<&str> for TBeanId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TBeanId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for TBeanId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TBeanId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identifier of a cluster member (a slave node).
///
/// A member is identified by the name of its reply-to destination, so two
/// replies from the same node always map to the same member.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    /// Create a MemberId from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "MemberId({})", short)
    }
}

impl From<&str> for MemberId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
