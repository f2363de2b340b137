use crate::writer::WriteError;
use btc_monitor_rpc_client::{RpcError, ServiceError};
use thiserror::Error;

/// Failure of one collection cycle
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("node RPC failed: {0}")]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("indexer unavailable: {0}")]
    Indexer(#[from] ServiceError),

    /// The cycle task panicked or was cancelled
    #[error("collection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type CollectorResult<T> = Result<T, CollectorError>;
