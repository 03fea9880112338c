//! Device Drivers - Block device capability for mounted file systems
//!
//! # Purpose
//! Defines the block-device interface that file systems attach to when they
//! are mounted. The POSIX I/O layer only keeps references to block devices;
//! reads and writes are issued by the concrete file system implementation.
//!
//! # Integration Points
//! - Depends on: nothing (leaf crate)
//! - Provides to: VFS (mount manager, file systems)
//! - Capabilities required: Device-specific (MMIO, DMA) in concrete drivers
//!
//! # Architecture
//! - `BlockDevice` trait with default hooks reporting `NotSupported`
//! - Shared, single-threaded handles (`BlockDeviceRef`) so one device can be
//!   attached to a file system and still be inspected by its owner
//!
//! # Testing Strategy
//! - Unit tests: default hooks, handle identity

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// Driver error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("Operation not supported by this device")]
    NotSupported,

    #[error("Block {block} out of range (device has {count} blocks)")]
    OutOfRange { block: u64, count: u64 },

    #[error("Buffer length {len} is not a multiple of the block size {block_size}")]
    Misaligned { len: usize, block_size: usize },

    #[error("Hardware error: {0}")]
    HardwareError(i32),
}

pub type Result<T> = core::result::Result<T, DriverError>;

/// Shared handle to a block device attached to a file system
pub type BlockDeviceRef = Rc<RefCell<dyn BlockDevice>>;

/// Block device trait
///
/// Every hook has a default body so that devices which only serve as a
/// mount reference (no storage behind them) need no boilerplate.
pub trait BlockDevice {
    /// Read `buf.len() / block_size()` blocks starting at `start`
    fn read_blocks(&mut self, _start: u64, _buf: &mut [u8]) -> Result<usize> {
        Err(DriverError::NotSupported)
    }

    /// Write `buf.len() / block_size()` blocks starting at `start`
    fn write_blocks(&mut self, _start: u64, _buf: &[u8]) -> Result<usize> {
        Err(DriverError::NotSupported)
    }

    /// Flush device caches
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get block size in bytes
    fn block_size(&self) -> usize {
        512
    }

    /// Get number of blocks, 0 if unknown
    fn block_count(&self) -> u64 {
        0
    }

    /// Validate a transfer against the device geometry
    fn check_transfer(&self, start: u64, len: usize) -> Result<()> {
        let block_size = self.block_size();
        if block_size == 0 || len % block_size != 0 {
            return Err(DriverError::Misaligned { len, block_size });
        }

        let count = self.block_count();
        let blocks = (len / block_size) as u64;
        if count != 0 && start.saturating_add(blocks) > count {
            return Err(DriverError::OutOfRange { block: start, count });
        }
        Ok(())
    }
}

/// Check whether two handles refer to the same device
pub fn same_device(a: &BlockDeviceRef, b: &BlockDeviceRef) -> bool {
    Rc::ptr_eq(a, b)
}
