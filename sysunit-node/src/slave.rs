//! Slave node: answers discovery and runs the work it is handed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysunit_core::{StartError, SystemTestCase, TBeanManager, WatchdogError};
use sysunit_types::{Command, Destination, MemberId};
use thiserror::Error;

use crate::bus::{Delivery, MessageBus};
use crate::config::SlaveConfig;
use crate::dispatcher::{BusDispatcher, CommandHandler, DispatchError, Dispatcher};
use crate::error::NodeError;
use crate::node::{Listener, Node};

/// Errors from launching a test node on a slave.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No test case is registered under this script.
    #[error("unknown script: {0}")]
    UnknownScript(String),

    /// A TBean failed to start.
    #[error(transparent)]
    Start(#[from] StartError),

    /// TBeans were still running when the watchdog expired.
    #[error(transparent)]
    Watchdog(#[from] WatchdogError),

    /// The blocking task running the case died.
    #[error("test node task failed: {0}")]
    Join(String),
}

/// Starts a test node when a slave is asked to.
#[async_trait]
pub trait TestNodeLauncher: Send + Sync {
    /// Launch `node_name` of `script`.
    async fn launch(&self, script: &str, node_name: &str) -> Result<(), LaunchError>;
}

/// Launcher that only records and logs what it was asked to start.
#[derive(Debug, Default)]
pub struct LoggingLauncher {
    launched: Mutex<Vec<(String, String)>>,
}

impl LoggingLauncher {
    /// Create an empty launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// `(script, node_name)` pairs launched so far, in arrival order.
    pub fn launched(&self) -> Vec<(String, String)> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TestNodeLauncher for LoggingLauncher {
    async fn launch(&self, script: &str, node_name: &str) -> Result<(), LaunchError> {
        tracing::info!("Starting test node {} of {}", node_name, script);
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((script.to_string(), node_name.to_string()));
        Ok(())
    }
}

type CaseBuilder = Arc<dyn Fn(&str) -> SystemTestCase + Send + Sync>;

/// Launcher that runs a registered [`SystemTestCase`] under a [`TBeanManager`].
///
/// The builder registered for a script receives the node name and returns
/// the case to run. The case runs on a blocking thread and the launch
/// completes once every bean finished or the watchdog expired.
pub struct CaseLauncher {
    cases: HashMap<String, CaseBuilder>,
    watchdog_timeout: Duration,
}

impl CaseLauncher {
    /// Create a launcher. A zero timeout waits for every bean.
    pub fn new(watchdog_timeout: Duration) -> Self {
        Self {
            cases: HashMap::new(),
            watchdog_timeout,
        }
    }

    /// Create a launcher from slave configuration.
    pub fn from_config(config: &SlaveConfig) -> Self {
        Self::new(config.watchdog_timeout())
    }

    /// Register the case builder for `script`, replacing any earlier one.
    pub fn register<F>(mut self, script: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&str) -> SystemTestCase + Send + Sync + 'static,
    {
        self.cases.insert(script.into(), Arc::new(builder));
        self
    }

    /// Scripts this launcher can run.
    pub fn scripts(&self) -> Vec<&str> {
        let mut scripts: Vec<&str> = self.cases.keys().map(String::as_str).collect();
        scripts.sort_unstable();
        scripts
    }
}

impl fmt::Debug for CaseLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseLauncher")
            .field("scripts", &self.scripts())
            .field("watchdog_timeout", &self.watchdog_timeout)
            .finish()
    }
}

#[async_trait]
impl TestNodeLauncher for CaseLauncher {
    async fn launch(&self, script: &str, node_name: &str) -> Result<(), LaunchError> {
        let builder = self
            .cases
            .get(script)
            .cloned()
            .ok_or_else(|| LaunchError::UnknownScript(script.to_string()))?;
        let node_name = node_name.to_string();
        let timeout = self.watchdog_timeout;

        tokio::task::spawn_blocking(move || -> Result<(), LaunchError> {
            let case = builder(&node_name);
            tracing::info!(
                "Running {} ({} tbean(s)) for node {}",
                case.name(),
                case.len(),
                node_name
            );
            let mut manager = TBeanManager::new();
            manager.start_tbeans(&case)?;
            manager.wait_for_tbeans(timeout)?;
            Ok(())
        })
        .await
        .map_err(|e| LaunchError::Join(e.to_string()))?
    }
}

/// Answers the master's advertisement and launches assigned work.
struct SlaveHandler<B> {
    bus: Arc<B>,
    reply_to: Destination,
    member_id: MemberId,
    launcher: Arc<dyn TestNodeLauncher>,
}

#[async_trait]
impl<B: MessageBus + 'static> CommandHandler for SlaveHandler<B> {
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        match delivery.command {
            Command::RequestMembers => {
                let Some(master) = delivery.reply_to else {
                    tracing::warn!("REQUEST_MEMBERS without reply-to; ignored");
                    return Ok(());
                };
                tracing::debug!("Member {} answering {}", self.member_id, master);
                BusDispatcher::new(Arc::clone(&self.bus), master, Some(self.reply_to.clone()))
                    .dispatch(Command::AddMember {
                        member_id: self.member_id.clone(),
                    })
                    .await?;
            }
            Command::StartTestNode { script, node_name } => {
                let launcher = Arc::clone(&self.launcher);
                let member_id = self.member_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = launcher.launch(&script, &node_name).await {
                        tracing::error!(
                            "Member {} failed to run node {} of {}: {}",
                            member_id,
                            node_name,
                            script,
                            e
                        );
                    }
                });
            }
            other => tracing::debug!("Slave ignoring {}", other.kind()),
        }
        Ok(())
    }
}

/// A slave node.
pub struct SlaveNode<B> {
    node: Node<B>,
    member_id: MemberId,
    launcher: Arc<dyn TestNodeLauncher>,
    listener: Option<Listener>,
}

impl<B: MessageBus + 'static> SlaveNode<B> {
    /// Create a slave listening on `slave_group`.
    ///
    /// The member id is the name of the slave's reply-to queue.
    pub fn new(bus: Arc<B>, slave_group: Destination, launcher: Arc<dyn TestNodeLauncher>) -> Self {
        let node = Node::new(bus, slave_group);
        let member_id = MemberId::new(node.reply_to().name());
        Self {
            node,
            member_id,
            launcher,
            listener: None,
        }
    }

    /// This slave's member id.
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// The slave group this slave listens on.
    pub fn slave_group(&self) -> &Destination {
        self.node.group()
    }

    /// The slave's reply-to destination.
    pub fn reply_to(&self) -> &Destination {
        self.node.reply_to()
    }

    /// Whether the slave is currently listening.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_running)
    }

    /// Start answering the master. Does nothing if already listening.
    pub async fn listen(&mut self) -> Result<(), NodeError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let handler = Arc::new(SlaveHandler {
            bus: Arc::clone(self.node.bus()),
            reply_to: self.node.reply_to().clone(),
            member_id: self.member_id.clone(),
            launcher: Arc::clone(&self.launcher),
        });
        self.listener = Some(self.node.listen(handler).await?);
        tracing::info!(
            "Slave {} listening on {}",
            self.member_id,
            self.node.group()
        );
        Ok(())
    }

    /// Stop listening. The reply-to queue becomes unreachable.
    pub fn stop(&mut self) {
        self.listener = None;
    }
}
