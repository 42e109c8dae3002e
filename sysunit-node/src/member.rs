//! Cluster member registry kept by the master.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sysunit_types::MemberId;

use crate::dispatcher::Dispatcher;

/// A discovered member and the dispatcher that reaches it.
#[derive(Clone)]
pub struct Member {
    /// Member identity (its reply-to destination name).
    pub id: MemberId,
    /// Dispatcher bound to the member's reply-to destination.
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Members discovered by a master, in discovery order.
///
/// Written by the master's receive loop, read by the dispatch round. A
/// member registering twice keeps its original position and gets the newer
/// dispatcher.
#[derive(Debug, Default)]
pub struct MemberMap {
    members: Mutex<Vec<Member>>,
}

impl MemberMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn members(&self) -> MutexGuard<'_, Vec<Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a member. Returns `true` if the member is new.
    pub fn insert(&self, id: MemberId, dispatcher: Arc<dyn Dispatcher>) -> bool {
        let mut members = self.members();
        match members.iter_mut().find(|m| m.id == id) {
            Some(existing) => {
                existing.dispatcher = dispatcher;
                false
            }
            None => {
                members.push(Member { id, dispatcher });
                true
            }
        }
    }

    /// Copy of the current members in discovery order.
    ///
    /// Later inserts do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Vec<Member> {
        self.members().clone()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &MemberId) -> bool {
        self.members().iter().any(|m| &m.id == id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Forget every member.
    pub fn clear(&self) {
        self.members().clear();
    }
}
