use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing `{0}` environment variable")]
    MissingEnvVar(String),

    #[error("Invalid address: `{0}`")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: `{0}`")]
    InvalidTxHash(String),

    #[error("Invalid block number: `{0}`")]
    InvalidBlockNumber(String),

    #[error("{0}")]
    Usage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction receipt not found: {0}")]
    ReceiptNotFound(String),

    #[error("Event decode failed: {0}")]
    EventDecode(String),

    #[error("No Initialize event found for pool id {0}")]
    PoolNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    #[error("Redis publish error: {0}")]
    RedisPublish(String),
}

impl From<alloy::transports::TransportError> for AppError {
    fn from(err: alloy::transports::TransportError) -> Self {
        AppError::Rpc(err.to_string())
    }
}

impl From<alloy::contract::Error> for AppError {
    fn from(err: alloy::contract::Error) -> Self {
        AppError::Rpc(err.to_string())
    }
}
