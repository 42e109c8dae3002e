//! Error types for sysunit-core.

use sysunit_types::TBeanId;
use thiserror::Error;

/// Error type returned by TBean work and TBean factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A TBean could not be started.
///
/// TBeans started before the failing one keep running; there is no rollback.
#[derive(Debug, Error)]
pub enum StartError {
    /// The factory failed to produce the TBean.
    #[error("failed to instantiate tbean {id}: {source}")]
    Instantiate {
        /// The TBean that could not be created.
        id: TBeanId,
        /// Factory error.
        source: BoxError,
    },

    /// The OS refused to spawn the TBean's thread.
    #[error("failed to spawn thread for tbean {id}: {source}")]
    Spawn {
        /// The TBean whose thread could not be spawned.
        id: TBeanId,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A TBean with this id is already running in the current run.
    #[error("tbean {id} is already running")]
    AlreadyRunning {
        /// The clashing TBean.
        id: TBeanId,
    },
}

impl StartError {
    /// The TBean that failed to start.
    pub fn tbean_id(&self) -> &TBeanId {
        match self {
            Self::Instantiate { id, .. }
            | Self::Spawn { id, .. }
            | Self::AlreadyRunning { id } => id,
        }
    }
}

/// A factory could not be added to a [`crate::SystemTestCase`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidFactory {
    /// A factory with the same name is already registered.
    #[error("duplicate tbean factory name: {name}")]
    Duplicate {
        /// The clashing name.
        name: TBeanId,
    },

    /// Factory names must not be empty.
    #[error("tbean factory name must not be empty")]
    EmptyName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_names_the_tbean() {
        let err = StartError::Instantiate {
            id: TBeanId::new("One"),
            source: "boom".into(),
        };
        assert_eq!(err.tbean_id(), "One");
        assert_eq!(err.to_string(), "failed to instantiate tbean One: boom");
    }

    #[test]
    fn already_running_names_the_tbean() {
        let err = StartError::AlreadyRunning {
            id: TBeanId::new("One"),
        };
        assert_eq!(err.tbean_id(), "One");
        assert_eq!(err.to_string(), "tbean One is already running");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StartError>();
        assert_send_sync::<InvalidFactory>();
    }
}
