//! ASIC chain abstraction.
//!
//! The register-level protocol driver lives behind [`Asic`]: the
//! hashrate monitor only needs to trigger counter register reads and
//! receive the replies. Replies arrive through a [`CounterSink`]
//! registered on the chain, mirroring how the RX dispatch path hands
//! off decoded register frames.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Receiver for chip counter register replies.
///
/// Implementations must tolerate being called from a different task
/// context than their readers.
pub trait CounterSink: Send + Sync {
    /// One decoded counter reply. `counter_now` is the raw 32-bit
    /// free-running counter, host-endian.
    fn on_register_reply(&self, chip: usize, counter_now: u32);
}

/// A chain of hashing ASICs addressable for register reads.
#[async_trait]
pub trait Asic: Send + Sync {
    /// Chip model designation (e.g. "BM1370").
    fn model(&self) -> &str;

    /// Kick off a counter register read across the chain. Replies are
    /// delivered asynchronously to the registered sink, one per chip.
    async fn trigger_counter_read(&self) -> Result<(), AsicError>;

    /// Register the sink that receives counter replies. Replaces any
    /// previously registered sink.
    fn set_counter_sink(&self, sink: Arc<dyn CounterSink>);
}

#[derive(Debug, Error)]
pub enum AsicError {
    #[error("chain communication failed: {0}")]
    Communication(String),

    #[error("chain not responding")]
    Timeout,

    #[error("chain not initialized")]
    NotReady,
}
