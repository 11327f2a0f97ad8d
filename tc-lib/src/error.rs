use crate::aggregator::{AdapterError, EntityId};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed or undersized input to a codec.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Builder preconditions were not met. Contains every unmet precondition.
    #[error("invalid state: {}", .0.join("; "))]
    InvalidState(Vec<String>),

    /// Frame construction or decomposition failed.
    #[error("frame wrap/unwrap error: {0}")]
    FrameWrapUnwrap(String),

    /// PDU or code block extraction failed at `offset`.
    #[error("parse failure at offset {offset}: {message}")]
    ParseFailure { offset: usize, message: String },

    /// The output adapter for an entity failed to send an aggregate payload.
    #[error("send failure for entity {entity} vcid {vcid}: {source}")]
    SendFailure {
        entity: EntityId,
        vcid: u8,
        #[source]
        source: AdapterError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
