use re_core::RulesError;
use thiserror::Error;

/// Errors from the ZeroMQ transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<TransportError> for RulesError {
    fn from(err: TransportError) -> Self {
        RulesError::Other(err.to_string())
    }
}
