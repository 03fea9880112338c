//! Character devices and their registry
//!
//! Devices live outside the mount namespace: any path starting with
//! [`DEVICE_PREFIX`] is looked up here first, and a matching device is opened
//! directly without involving a filesystem. Device objects are owned by the
//! embedding code, not by a pool, so closing one never releases storage.

use core::cell::RefCell;
use std::rc::Rc;

use crate::config::{DEVICE_PREFIX, MAX_DEVICE_NAME};
use crate::error::{Result, VfsError};
use crate::io::Io;
use crate::types::{Mode, OpenFlags};

/// A character device
pub trait CharDevice: Io {
    /// Name under [`DEVICE_PREFIX`], e.g. `"uart0"` for `/dev/uart0`
    fn name(&self) -> &str;

    /// Whether `name` (prefix removed) designates this device
    fn match_name(&self, name: &str) -> bool {
        self.name() == name
    }

    /// Open the device
    ///
    /// # Arguments
    /// * `path` - The full path, prefix included
    /// * `flags` - Open flags as passed by the caller
    /// * `mode` - Permission bits as passed by the caller
    fn do_open(&mut self, path: &str, flags: OpenFlags, mode: Mode) -> Result<()>;
}

pub type CharDeviceRef = Rc<RefCell<dyn CharDevice>>;

/// Bounded table of registered character devices
pub struct DeviceRegistry {
    devices: Vec<Option<CharDeviceRef>>,
}

impl DeviceRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            devices: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.devices.len()
    }

    /// Register a device under its own name
    ///
    /// # Errors
    /// - [`VfsError::InvalidArgument`] if the name is empty or too long
    /// - [`VfsError::Busy`] if the device or another one with the same name is registered
    /// - [`VfsError::NoSpace`] if the registry is full
    pub fn register(&mut self, device: CharDeviceRef) -> Result<()> {
        let name_len = device.borrow().name().len();
        if name_len == 0 || name_len > MAX_DEVICE_NAME {
            return Err(VfsError::InvalidArgument);
        }

        for existing in self.devices.iter().flatten() {
            if Rc::ptr_eq(existing, &device) || existing.borrow().name() == device.borrow().name() {
                return Err(VfsError::Busy);
            }
        }

        let slot = self
            .devices
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(VfsError::NoSpace)?;

        log::debug!("registered device {}{}", DEVICE_PREFIX, device.borrow().name());
        *slot = Some(device);
        Ok(())
    }

    /// Remove the device registered as `name`
    ///
    /// # Errors
    /// [`VfsError::NoSuchEntity`] if no device has that name
    pub fn unregister(&mut self, name: &str) -> Result<CharDeviceRef> {
        let slot = self
            .devices
            .iter_mut()
            .find(|slot| matches!(slot, Some(dev) if dev.borrow().name() == name))
            .ok_or(VfsError::NoSuchEntity)?;

        log::debug!("unregistered device {}{}", DEVICE_PREFIX, name);
        slot.take().ok_or(VfsError::NoSuchEntity)
    }

    /// Device in registry slot `index`
    pub fn device(&self, index: usize) -> Option<CharDeviceRef> {
        self.devices.get(index).and_then(Clone::clone)
    }

    /// Find the device designated by `path`
    ///
    /// Only paths starting with [`DEVICE_PREFIX`] can name a device.
    pub fn identify(&self, path: &str) -> Option<CharDeviceRef> {
        let name = path.strip_prefix(DEVICE_PREFIX)?;
        self.devices
            .iter()
            .flatten()
            .find(|dev| dev.borrow().match_name(name))
            .cloned()
    }
}
