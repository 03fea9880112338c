//! Build-time configuration
//!
//! Table capacities and path conventions are fixed when the image is built.
//! The dispatch layer reads them once at construction.

use static_assertions::const_assert;

/// Path prefix under which character devices are registered
pub const DEVICE_PREFIX: &str = "/dev/";

/// Descriptors 0, 1 and 2 are kept for the standard streams
pub const STDIO_RESERVED: usize = 3;

/// Default capacity of the file descriptor table
pub const DEFAULT_DESCRIPTORS: usize = 10;

/// Default number of mount points (root excluded)
pub const DEFAULT_MOUNTS: usize = 4;

/// Default number of registered character devices
pub const DEFAULT_DEVICES: usize = 8;

/// Longest accepted mount path, including both separators
pub const MAX_MOUNT_PATH: usize = 64;

/// Longest accepted device name (without prefix)
pub const MAX_DEVICE_NAME: usize = 32;

/// Longest directory entry name in bytes
pub const DIRENT_NAME_MAX: usize = 256;

const_assert!(DEFAULT_DESCRIPTORS > STDIO_RESERVED);
const_assert!(DEFAULT_MOUNTS > 0);
const_assert!(MAX_MOUNT_PATH >= 2);
