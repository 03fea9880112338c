//! Filesystems
//!
//! A filesystem owns a file pool and a directory pool and is attached to
//! at most one block device. Path arguments reaching the hooks are always
//! filesystem-relative: the mount prefix has been stripped but the leading
//! `/` is kept.

use core::cell::RefCell;
use std::rc::Rc;

use kaal_drivers::{BlockDevice, BlockDeviceRef};

use crate::directory::{DirHandle, DirectoryPool};
use crate::error::{Result, VfsError};
use crate::file::{FilePool, FileRef};
use crate::io::IoRef;
use crate::types::{FileStat, Mode, MountFlags, OpenFlags, UTimes};

/// State shared by all filesystems
#[derive(Default)]
pub struct FsBase {
    files: Option<Rc<dyn FilePool>>,
    dirs: Option<Rc<dyn DirectoryPool>>,
    block_device: Option<BlockDeviceRef>,
}

impl FsBase {
    /// # Arguments
    /// * `files` - Pool providing objects for `open`
    /// * `dirs` - Pool providing objects for `opendir`
    pub fn new(files: Rc<dyn FilePool>, dirs: Rc<dyn DirectoryPool>) -> Self {
        Self {
            files: Some(files),
            dirs: Some(dirs),
            block_device: None,
        }
    }

    /// A filesystem without directories
    pub fn with_files(files: Rc<dyn FilePool>) -> Self {
        Self {
            files: Some(files),
            ..Self::default()
        }
    }
}

/// A mountable filesystem
///
/// Path hooks default to [`VfsError::NotSupported`]; mount, unmount and
/// sync default to success.
pub trait FileSystem {
    fn fs_base(&self) -> &FsBase;
    fn fs_base_mut(&mut self) -> &mut FsBase;

    fn do_mount(&mut self, _flags: MountFlags) -> Result<()> {
        Ok(())
    }

    fn do_unmount(&mut self, _flags: MountFlags) -> Result<()> {
        Ok(())
    }

    /// Flush cached state to the block device
    fn do_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn do_chmod(&mut self, _path: &str, _mode: Mode) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_stat(&mut self, _path: &str) -> Result<FileStat> {
        Err(VfsError::NotSupported)
    }

    fn do_truncate(&mut self, _path: &str, _length: i64) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_rename(&mut self, _existing: &str, _new: &str) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_unlink(&mut self, _path: &str) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    /// Set access and modification times, `None` meaning "now"
    fn do_utime(&mut self, _path: &str, _times: Option<&UTimes>) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_mkdir(&mut self, _path: &str, _mode: Mode) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_rmdir(&mut self, _path: &str) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    /// Block device the filesystem is attached to
    fn block_device(&self) -> Option<BlockDeviceRef> {
        self.fs_base().block_device.clone()
    }

    fn set_block_device(&mut self, device: Option<BlockDeviceRef>) {
        self.fs_base_mut().block_device = device;
    }

    /// Read whole blocks from the attached block device
    ///
    /// For use by filesystem hooks; the transfer is checked against the
    /// device geometry before the driver sees it.
    ///
    /// # Errors
    /// - [`VfsError::NotSupported`] if no block device is attached
    /// - [`VfsError::InvalidArgument`] for a misaligned or out-of-range transfer
    /// - Driver failures, converted from [`kaal_drivers::DriverError`]
    fn read_blocks(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let dev = self.block_device().ok_or(VfsError::NotSupported)?;
        let mut dev = dev.borrow_mut();
        dev.check_transfer(start, buf.len())?;
        Ok(dev.read_blocks(start, buf)?)
    }

    /// Write whole blocks to the attached block device
    ///
    /// # Errors
    /// See [`FileSystem::read_blocks`]
    fn write_blocks(&self, start: u64, buf: &[u8]) -> Result<usize> {
        let dev = self.block_device().ok_or(VfsError::NotSupported)?;
        let mut dev = dev.borrow_mut();
        dev.check_transfer(start, buf.len())?;
        Ok(dev.write_blocks(start, buf)?)
    }

    /// Open a file
    ///
    /// Acquires a file object from the file pool and runs its open hook.
    /// The object goes back to the pool if the hook fails.
    ///
    /// # Errors
    /// - [`VfsError::NotSupported`] if the filesystem has no file pool
    /// - [`VfsError::TooManyOpenFiles`] if the pool is exhausted
    /// - Whatever the open hook reports
    fn open(&mut self, path: &str, flags: OpenFlags, mode: Mode) -> Result<FileRef> {
        let files = self.fs_base().files.clone().ok_or(VfsError::NotSupported)?;
        let file = files.acquire_file().ok_or_else(|| {
            log::debug!("no free file object for {}", path);
            VfsError::TooManyOpenFiles
        })?;

        let opened = file.borrow_mut().do_open(path, flags, mode);
        if let Err(err) = opened {
            IoRef::File(file).release();
            return Err(err);
        }
        Ok(file)
    }

    /// Open a directory stream
    ///
    /// # Errors
    /// - [`VfsError::NotSupported`] if the filesystem has no directory pool
    /// - [`VfsError::TooManyOpenFiles`] if the pool is exhausted
    /// - Whatever the open hook reports
    fn opendir(&mut self, dirname: &str) -> Result<DirHandle> {
        let dirs = self.fs_base().dirs.clone().ok_or(VfsError::NotSupported)?;
        let dir = DirHandle::new(dirs.acquire_dir().ok_or_else(|| {
            log::debug!("no free directory object for {}", dirname);
            VfsError::TooManyOpenFiles
        })?);

        let opened = dir.object().borrow_mut().do_open(dirname);
        if let Err(err) = opened {
            let addr = Rc::as_ptr(dir.object()) as *const ();
            dir.object().borrow_mut().dir_base_mut().link.release(addr);
            return Err(err);
        }
        Ok(dir)
    }
}

pub type FsHandle = Rc<RefCell<dyn FileSystem>>;
