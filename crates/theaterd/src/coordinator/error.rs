use super::dispatch::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to send '{command}' to {device_id}: {source}")]
    Dispatch {
        device_id: String,
        command: String,
        #[source]
        source: SinkError,
    },

    #[error("Failed to switch {entity_id}: {source}")]
    Entity {
        entity_id: String,
        #[source]
        source: SinkError,
    },

    #[error("Theater coordinator is not running")]
    Stopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
