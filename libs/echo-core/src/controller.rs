use std::fmt;

use echo_api::BusError;

use crate::config::ConfigError;

/// Lifecycle of every controller. There is no stopped state: a running
/// controller stays running until its process goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Running,
}

/// Bus resource a controller creates during `init()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Participant,
    Type,
    Topic,
    Writer,
    Reader,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Participant => f.write_str("participant"),
            Resource::Type => f.write_str("type registration"),
            Resource::Topic => f.write_str("topic"),
            Resource::Writer => f.write_str("writer"),
            Resource::Reader => f.write_str("reader"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("{controller}: cannot create {resource}: {source}")]
    Init {
        controller: &'static str,
        resource: Resource,
        source: BusError,
    },

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("publish on '{topic}' failed: {source}")]
    Delivery { topic: String, source: BusError },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ControllerError {
    /// True for failures that leave the controller uninitialized for good.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ControllerError::Delivery { .. })
    }
}

/// Wrap one `init()` step: a bus error becomes `ControllerError::Init` for
/// `resource`.
pub(crate) fn init_step<T>(
    controller: &'static str,
    resource: Resource,
    result: Result<T, BusError>,
) -> Result<T, ControllerError> {
    result.map_err(|source| {
        tracing::error!(controller, resource = %resource, error = %source, "initialization failed");
        ControllerError::Init {
            controller,
            resource,
            source,
        }
    })
}
