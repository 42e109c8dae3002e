//! Master node: discovers slaves, then spreads work across them.
//!
//! # Protocol
//!
//! ```text
//! Master                         slave group topic            Slave
//!   │ REQUEST_MEMBERS (reply-to=M) ──────►│──────────────────────►│
//!   │◄──────────────────────────── ADD_MEMBER (reply-to=S) ───────│
//!   │  … registration window …                                    │
//!   │ START_TEST_NODE ───────────────────────────────────────────►│ (queue S)
//! ```
//!
//! Membership is best-effort: whoever answered before the window closed
//! takes part in the round, later answers wait for the next one. Work is
//! fire-and-forget; the master does not wait for the nodes to finish.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use sysunit_types::{Command, Destination, MemberId};

use crate::bus::{Delivery, MessageBus};
use crate::config::MasterConfig;
use crate::dispatcher::{BusDispatcher, CommandHandler, DispatchError, Dispatcher};
use crate::error::NodeError;
use crate::member::{Member, MemberMap};
use crate::node::{Listener, Node};

/// Default registration window.
pub const DEFAULT_REGISTRATION_WINDOW: Duration = Duration::from_millis(2000);

/// One work item assigned to one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// The work item (test node name).
    pub node_name: String,
    /// Index of the member in the round's snapshot.
    pub member_index: usize,
    /// The member that received the work.
    pub member_id: MemberId,
}

/// Outcome of a completed dispatch round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// The script every node was started with.
    pub script: String,
    /// Number of members in the round's snapshot.
    pub member_count: usize,
    /// Assignments in dispatch order.
    pub assignments: Vec<Assignment>,
}

impl DispatchReport {
    /// Node names assigned to `member`, in dispatch order.
    pub fn nodes_for(&self, member: &MemberId) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|a| &a.member_id == member)
            .map(|a| a.node_name.as_str())
            .collect()
    }
}

/// Send one `StartTestNode` per name, cycling through `members` in order.
///
/// Stops at the first failed dispatch. With no members nothing is sent.
pub async fn round_robin(
    script: &str,
    node_names: &[String],
    members: &[Member],
) -> Result<DispatchReport, DispatchError> {
    if members.is_empty() {
        return Err(DispatchError::EmptyCluster {
            work_items: node_names.len(),
        });
    }

    let mut assignments = Vec::with_capacity(node_names.len());
    for (dispatched, node_name) in node_names.iter().enumerate() {
        let member_index = dispatched % members.len();
        let member = &members[member_index];

        member
            .dispatcher
            .dispatch(Command::start_test_node(script, node_name.as_str()))
            .await
            .map_err(|source| DispatchError::Aborted {
                node_name: node_name.clone(),
                member_index,
                member_count: members.len(),
                dispatched,
                source: Box::new(source),
            })?;

        tracing::info!("Assigned node {} to member {}", node_name, member.id);
        assignments.push(Assignment {
            node_name: node_name.clone(),
            member_index,
            member_id: member.id.clone(),
        });
    }

    Ok(DispatchReport {
        script: script.to_string(),
        member_count: members.len(),
        assignments,
    })
}

/// Records slaves that answer the master's advertisement.
struct MasterHandler<B> {
    bus: Arc<B>,
    reply_to: Destination,
    members: Arc<MemberMap>,
}

#[async_trait]
impl<B: MessageBus + 'static> CommandHandler for MasterHandler<B> {
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        match delivery.command {
            Command::AddMember { member_id } => {
                let Some(member_queue) = delivery.reply_to else {
                    tracing::warn!("ADD_MEMBER from {} without reply-to; ignored", member_id);
                    return Ok(());
                };
                let dispatcher = BusDispatcher::new(
                    Arc::clone(&self.bus),
                    member_queue,
                    Some(self.reply_to.clone()),
                );
                if self.members.insert(member_id.clone(), Arc::new(dispatcher)) {
                    tracing::debug!(
                        "Registered member {} (total: {})",
                        member_id,
                        self.members.len()
                    );
                } else {
                    tracing::debug!("Member {} re-registered", member_id);
                }
            }
            other => tracing::debug!("Master ignoring {}", other.kind()),
        }
        Ok(())
    }
}

/// A master node.
pub struct MasterNode<B> {
    node: Node<B>,
    slave_group: BusDispatcher<B>,
    members: Arc<MemberMap>,
    registration_window: Duration,
    listener: Option<Listener>,
}

impl<B: MessageBus + 'static> MasterNode<B> {
    /// Create a master on `group` that recruits slaves from `slave_group`.
    pub fn new(bus: Arc<B>, group: Destination, slave_group: Destination) -> Self {
        let node = Node::new(bus, group);
        let slave_group = node.dispatcher_to(slave_group);
        Self {
            node,
            slave_group,
            members: Arc::new(MemberMap::new()),
            registration_window: DEFAULT_REGISTRATION_WINDOW,
            listener: None,
        }
    }

    /// Create a master from configuration.
    pub fn from_config(bus: Arc<B>, config: &MasterConfig) -> Self {
        let group = bus.destination(&config.group);
        let slave_group = bus.destination(&config.slave_group);
        Self::new(bus, group, slave_group).with_registration_window(config.registration_window())
    }

    /// Set how long to wait for slaves after advertising.
    pub fn with_registration_window(mut self, window: Duration) -> Self {
        self.registration_window = window;
        self
    }

    /// The registration window.
    pub fn registration_window(&self) -> Duration {
        self.registration_window
    }

    /// Members discovered so far.
    pub fn members(&self) -> &Arc<MemberMap> {
        &self.members
    }

    /// The master's reply-to destination.
    pub fn reply_to(&self) -> &Destination {
        self.node.reply_to()
    }

    /// The slave group the master advertises on.
    pub fn slave_group(&self) -> &Destination {
        self.slave_group.destination()
    }

    /// Start receiving replies. Does nothing if already listening.
    pub async fn listen(&mut self) -> Result<(), NodeError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let handler = Arc::new(MasterHandler {
            bus: Arc::clone(self.node.bus()),
            reply_to: self.node.reply_to().clone(),
            members: Arc::clone(&self.members),
        });
        self.listener = Some(self.node.listen(handler).await?);
        Ok(())
    }

    /// Ask every slave on the slave group to announce itself.
    pub async fn advertise(&self) -> Result<(), DispatchError> {
        tracing::info!("Advertising on {}", self.slave_group.destination());
        self.slave_group.dispatch(Command::RequestMembers).await
    }

    /// Run one full round: advertise, wait out the registration window,
    /// then round-robin `node_names` over the members that answered.
    ///
    /// Members from earlier rounds are forgotten; only slaves answering this
    /// round's advertisement take part.
    pub async fn start(
        &mut self,
        script: &str,
        node_names: &[String],
    ) -> Result<DispatchReport, NodeError> {
        self.listen().await?;
        self.members.clear();
        self.advertise().await?;

        tokio::time::sleep(self.registration_window).await;

        let members = self.members.snapshot();
        tracing::info!(
            "Registration window closed with {} member(s); dispatching {} node(s)",
            members.len(),
            node_names.len()
        );

        Ok(round_robin(script, node_names, &members).await?)
    }
}
