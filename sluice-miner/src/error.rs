//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("board error: {0}")]
    Board(#[from] crate::board::BoardError),

    #[error("asic error: {0}")]
    Asic(#[from] crate::asic::AsicError),

    #[error("hashrate monitor error: {0}")]
    Monitor(#[from] crate::hashrate::MonitorError),

    #[error("api client error: {0}")]
    Client(#[from] crate::api_client::ClientError),

    #[error("chart storage error: {0}")]
    Storage(#[from] crate::chart::store::StorageError),

    #[error("{0}")]
    Other(String),
}
