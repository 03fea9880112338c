//! File descriptor table
//!
//! Bounded registry mapping small integers to open I/O objects. The table
//! never grows: its capacity is fixed at construction. Descriptors below
//! [`STDIO_RESERVED`] belong to the standard streams and are never handed
//! out by [`FileDescriptorTable::alloc`]; they can only be bound explicitly
//! with [`FileDescriptorTable::install`].
//!
//! Allocation always picks the lowest free descriptor, so a freed number is
//! the first to be reused.

use core::fmt;

use crate::config::STDIO_RESERVED;
use crate::error::{Result, VfsError};
use crate::io::IoRef;
use crate::types::Fd;

/// The table of open descriptors
pub struct FileDescriptorTable {
    slots: Vec<Option<IoRef>>,
}

impl FileDescriptorTable {
    /// Create a table with `capacity` descriptors, all free
    pub fn new(capacity: usize) -> Self {
        log::debug!("descriptor table: {} slots", capacity);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Number of descriptors, reserved ones included
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, fd: Fd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < self.slots.len())
    }

    /// Returns true if `fd` is in range and bound to an object
    pub fn is_valid(&self, fd: Fd) -> bool {
        self.index(fd).map_or(false, |i| self.slots[i].is_some())
    }

    /// Returns the object bound to `fd`
    pub fn io(&self, fd: Fd) -> Option<IoRef> {
        self.index(fd).and_then(|i| self.slots[i].clone())
    }

    /// Bind `io` to the lowest free descriptor
    ///
    /// # Returns
    /// The descriptor, which is also recorded on the object
    ///
    /// # Errors
    /// - [`VfsError::Busy`] if `io` already holds a descriptor
    /// - [`VfsError::TooManyOpenFiles`] if every descriptor is bound
    pub fn alloc(&mut self, io: &IoRef) -> Result<Fd> {
        if let Some(fd) = io.fd() {
            log::debug!("object already bound to descriptor {}", fd);
            return Err(VfsError::Busy);
        }

        for i in STDIO_RESERVED..self.slots.len() {
            if self.slots[i].is_none() {
                let fd = i as Fd;
                self.slots[i] = Some(io.clone());
                io.set_fd(Some(fd));
                log::debug!("allocated descriptor {} ({:?})", fd, io.kind());
                return Ok(fd);
            }
        }

        Err(VfsError::TooManyOpenFiles)
    }

    /// Bind `io` to a specific descriptor, typically a standard stream
    ///
    /// # Errors
    /// - [`VfsError::BadFileDescriptor`] if `fd` is out of range
    /// - [`VfsError::Busy`] if `fd` is taken or `io` already holds a descriptor
    pub fn install(&mut self, fd: Fd, io: &IoRef) -> Result<()> {
        let i = self.index(fd).ok_or(VfsError::BadFileDescriptor)?;
        if self.slots[i].is_some() || io.fd().is_some() {
            return Err(VfsError::Busy);
        }

        self.slots[i] = Some(io.clone());
        io.set_fd(Some(fd));
        Ok(())
    }

    /// Unbind `fd`
    ///
    /// The object's stored descriptor is cleared as well.
    ///
    /// # Errors
    /// [`VfsError::BadFileDescriptor`] if `fd` is out of range or already free
    pub fn free(&mut self, fd: Fd) -> Result<()> {
        let i = self.index(fd).ok_or(VfsError::BadFileDescriptor)?;
        let io = self.slots[i].take().ok_or(VfsError::BadFileDescriptor)?;
        io.set_fd(None);
        log::debug!("freed descriptor {}", fd);
        Ok(())
    }

    /// Bound descriptors in ascending order
    pub fn bound(&self) -> impl Iterator<Item = (Fd, &IoRef)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|io| (i as Fd, io)))
    }

    /// Number of bound descriptors
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl fmt::Debug for FileDescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FileDescriptorTable[")?;
        for (fd, io) in self.bound() {
            writeln!(f, "  {} -> {:?}", fd, io.kind())?;
        }
        write!(f, "]")
    }
}
