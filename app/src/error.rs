use ambiental_core::error::{PayloadError, UnknownStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DBError {
    #[error(transparent)]
    SQLError(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid row: {0}")]
    InvalidRow(#[from] UnknownStatus),
    #[error("Did not found device: {0}")]
    DeviceNotFound(i32),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum MQTTError {
    #[error("Invalid broker address: {0}")]
    InvalidBroker(String),
    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("Broker rejected subscription: {0}")]
    SubscribeRejected(String),
    #[error("Timeout waiting for {0}")]
    Timeout(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Connection lost before acknowledgment")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed looking up sensors: {0}")]
    Lookup(#[source] DBError),
    #[error("Failed creating fallback sensor: {0}")]
    FallbackCreation(#[source] DBError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A device with topic {0} already exists")]
    DuplicateTopic(String),
    #[error("Did not found device: {0}")]
    DeviceNotFound(i32),
    #[error("Topic must not be empty")]
    EmptyTopic,
    #[error("Topic has leading or trailing whitespace: {0:?}")]
    PaddedTopic(String),
    #[error(transparent)]
    DB(#[from] DBError),
    #[error(transparent)]
    MQTT(#[from] MQTTError),
}
