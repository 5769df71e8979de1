use echo_api::BusError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryBusError {
    #[error("bus has been shut down")]
    Shutdown,

    #[error("type '{type_name}' is not registered with participant '{participant}'")]
    UnknownType { type_name: String, participant: String },

    #[error("type '{0}' is already registered with a different schema")]
    SchemaConflict(String),

    #[error("topic '{topic}' carries '{existing}', cannot join it as '{requested}'")]
    TypeMismatch { topic: String, existing: String, requested: String },

    #[error("topic '{topic}' was not created by participant '{participant}'")]
    TopicNotFound { topic: String, participant: String },

    #[error("no tokio runtime to drive sample delivery")]
    NoRuntime,
}

impl MemoryBusError {
    /// Convert to BusError, mapping each variant to its ErrorKind.
    pub fn into_bus_error(self) -> BusError {
        match self {
            MemoryBusError::Shutdown => BusError::closed(self.to_string()),
            MemoryBusError::NoRuntime => BusError::resource(self.to_string()),
            other => BusError::config(other.to_string()),
        }
    }
}

impl From<MemoryBusError> for BusError {
    fn from(e: MemoryBusError) -> Self {
        e.into_bus_error()
    }
}
