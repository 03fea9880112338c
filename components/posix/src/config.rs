//! Dispatch-layer configuration
//!
//! Capacities are read once when the context is built and never change
//! afterwards.

use kaal_vfs::config::{DEFAULT_DESCRIPTORS, DEFAULT_DEVICES, DEFAULT_MOUNTS, STDIO_RESERVED};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Descriptor table needs more than {reserved} slots, got {descriptors}")]
    TooFewDescriptors { descriptors: usize, reserved: usize },

    #[error("Mount table needs at least one slot")]
    NoMountPoints,
}

/// Table capacities of a [`PosixIo`](crate::PosixIo) context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixConfig {
    /// File descriptor table capacity, standard streams included
    pub descriptors: usize,
    /// Mount points, root excluded
    pub mounts: usize,
    /// Character devices
    pub devices: usize,
}

impl PosixConfig {
    /// Check that the capacities describe a usable context
    ///
    /// # Errors
    /// - [`ConfigError::TooFewDescriptors`] if no descriptor is left after the standard streams
    /// - [`ConfigError::NoMountPoints`] if the mount table is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptors <= STDIO_RESERVED {
            return Err(ConfigError::TooFewDescriptors {
                descriptors: self.descriptors,
                reserved: STDIO_RESERVED,
            });
        }
        if self.mounts == 0 {
            return Err(ConfigError::NoMountPoints);
        }
        Ok(())
    }
}

impl Default for PosixConfig {
    fn default() -> Self {
        Self {
            descriptors: DEFAULT_DESCRIPTORS,
            mounts: DEFAULT_MOUNTS,
            devices: DEFAULT_DEVICES,
        }
    }
}
