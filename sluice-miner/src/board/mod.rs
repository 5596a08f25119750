//! Mining board abstraction and registry.
//!
//! A board bundles an ASIC chain with its identity and nominal
//! performance figures. Board implementations register themselves with
//! `inventory::submit!` so the daemon can discover them by device type
//! at runtime without a central list.

pub mod bench;

use async_trait::async_trait;
use std::{future::Future, pin::Pin, sync::Arc};
use thiserror::Error;

use crate::asic::Asic;

/// A mining board: one ASIC chain plus board-level identity.
#[async_trait]
pub trait Board: Send + Sync {
    /// Board model name (e.g. "Bench Octa").
    fn model(&self) -> &str;

    /// Number of chips on the chain. Drives per-chip accounting in the
    /// hashrate monitor.
    fn chip_count(&self) -> usize;

    /// Nominal full-speed hashrate for this board in H/s.
    fn expected_hashrate_hs(&self) -> f64;

    /// The ASIC chain mounted on this board.
    fn asic(&self) -> Arc<dyn Asic>;

    /// Stop all activity and put the hardware in a safe state.
    async fn shutdown(&mut self) -> Result<(), BoardError>;
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board initialization failed: {0}")]
    InitializationFailed(String),

    #[error("unsupported board: {0}")]
    Unsupported(String),
}

/// Helper type for async board factory functions
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Factory function signature for creating a virtual board.
///
/// Virtual boards are configured from environment variables rather
/// than discovered hardware.
pub type VirtualBoardFactoryFn = fn() -> BoxFuture<'static, crate::error::Result<Box<dyn Board>>>;

/// Descriptor for virtual boards (bench rigs, test boards, etc.).
///
/// Registered via `inventory::submit!` and matched on a device type
/// string.
pub struct VirtualBoardDescriptor {
    /// Device type identifier (e.g. "bench")
    pub device_type: &'static str,
    /// Human-readable board name
    pub name: &'static str,
    /// Factory function to create the board
    pub create_fn: VirtualBoardFactoryFn,
}

inventory::collect!(VirtualBoardDescriptor);

/// Registry for virtual board descriptors.
pub struct VirtualBoardRegistry;

impl VirtualBoardRegistry {
    /// Find a virtual board descriptor by device type.
    pub fn find(&self, device_type: &str) -> Option<&'static VirtualBoardDescriptor> {
        inventory::iter::<VirtualBoardDescriptor>().find(|desc| desc.device_type == device_type)
    }

    /// Create a board by device type.
    pub async fn create(&self, device_type: &str) -> crate::error::Result<Box<dyn Board>> {
        let desc = self.find(device_type).ok_or_else(|| {
            crate::error::Error::Other(format!("no board registered for type '{device_type}'"))
        })?;
        (desc.create_fn)().await
    }
}
