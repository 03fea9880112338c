//! Directory streams
//!
//! Directories are not I/O objects: they are never bound to a descriptor.
//! They come from a filesystem's directory pool on `opendir` and go back on
//! close, whatever the close hook reports.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use crate::config::DIRENT_NAME_MAX;
use crate::error::{Result, VfsError};
use crate::pool::{ObjectPool, PoolLink};

/// One entry of a directory stream
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number, 0 when the filesystem has none
    pub ino: u64,
    name: [u8; DIRENT_NAME_MAX],
    name_len: usize,
}

impl DirEntry {
    pub fn new(ino: u64, name: &str) -> Self {
        let mut entry = Self {
            ino,
            ..Self::default()
        };
        entry.set_name(name);
        entry
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }

    /// Store `name`, truncated to [`DIRENT_NAME_MAX`] bytes on a character boundary
    pub fn set_name(&mut self, name: &str) {
        let mut len = name.len().min(DIRENT_NAME_MAX);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.name_len = len;
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self {
            ino: 0,
            name: [0; DIRENT_NAME_MAX],
            name_len: 0,
        }
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("ino", &self.ino)
            .field("name", &self.name())
            .finish()
    }
}

/// State shared by all directory objects
#[derive(Default)]
pub struct DirBase {
    /// Last entry produced by `read`
    pub(crate) entry: DirEntry,
    pub(crate) link: PoolLink,
}

impl DirBase {
    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }
}

/// An open directory stream
pub trait Directory {
    fn dir_base(&self) -> &DirBase;
    fn dir_base_mut(&mut self) -> &mut DirBase;

    /// Open `dirname` (filesystem-relative, leading `/`)
    fn do_open(&mut self, dirname: &str) -> Result<()>;

    /// Produce the next entry into `entry`
    ///
    /// # Returns
    /// `false` at end of stream
    fn do_read(&mut self, _entry: &mut DirEntry) -> Result<bool> {
        Err(VfsError::NotSupported)
    }

    fn do_rewind(&mut self) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type DirRef = Rc<RefCell<dyn Directory>>;

/// Source of directory objects for a filesystem
pub trait DirectoryPool {
    fn acquire_dir(&self) -> Option<DirRef>;
}

impl<T: Directory + 'static> DirectoryPool for ObjectPool<T> {
    fn acquire_dir(&self) -> Option<DirRef> {
        let dir = self.acquire()?;
        dir.borrow_mut().dir_base_mut().link.attach(self.owner());
        let dir: DirRef = dir;
        Some(dir)
    }
}

/// Handle to an open directory stream
///
/// The handle is the sole owner of the stream; [`DirHandle::close`]
/// consumes it.
pub struct DirHandle(DirRef);

impl DirHandle {
    pub(crate) fn new(dir: DirRef) -> Self {
        Self(dir)
    }

    /// The directory object behind the handle
    pub fn object(&self) -> &DirRef {
        &self.0
    }

    /// Read the next entry
    ///
    /// # Returns
    /// - `Ok(Some(entry))` for each entry in the stream
    /// - `Ok(None)` at end of stream
    pub fn read(&self) -> Result<Option<DirEntry>> {
        let mut dir = self.0.borrow_mut();
        let mut entry = dir.dir_base().entry;
        let more = dir.do_read(&mut entry)?;
        dir.dir_base_mut().entry = entry;
        Ok(more.then_some(entry))
    }

    /// Restart the stream from its first entry
    pub fn rewind(&self) -> Result<()> {
        self.0.borrow_mut().do_rewind()
    }

    /// Last entry produced by [`DirHandle::read`]
    pub fn entry(&self) -> DirEntry {
        self.0.borrow().dir_base().entry
    }

    /// Close the stream and return the object to its pool
    ///
    /// The object is released even when the close hook fails.
    pub fn close(self) -> Result<()> {
        let addr = Rc::as_ptr(&self.0) as *const ();
        let mut dir = self.0.borrow_mut();
        let result = dir.do_close();
        dir.dir_base_mut().link.release(addr);
        result
    }
}

impl fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirHandle")
            .field(&(Rc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestDir {
        base: DirBase,
        path: String,
        count: u32,
        closed: bool,
    }

    impl Directory for TestDir {
        fn dir_base(&self) -> &DirBase {
            &self.base
        }

        fn dir_base_mut(&mut self) -> &mut DirBase {
            &mut self.base
        }

        fn do_open(&mut self, dirname: &str) -> Result<()> {
            self.path = dirname.to_string();
            self.count = 1;
            self.closed = false;
            Ok(())
        }

        fn do_read(&mut self, entry: &mut DirEntry) -> Result<bool> {
            if self.count > 3 {
                return Ok(false);
            }
            entry.set_name(&format!("file{}", self.count));
            entry.ino = self.count as u64;
            self.count += 1;
            Ok(true)
        }

        fn do_rewind(&mut self) -> Result<()> {
            self.count = 1;
            Ok(())
        }

        fn do_close(&mut self) -> Result<()> {
            self.closed = true;
            Err(VfsError::Other(5))
        }
    }

    #[test]
    fn test_dir_entry_name() {
        let entry = DirEntry::new(7, "file1");
        assert_eq!(entry.ino, 7);
        assert_eq!(entry.name(), "file1");
        assert_eq!(DirEntry::default().name(), "");

        let long = "é".repeat(DIRENT_NAME_MAX);
        let entry = DirEntry::new(0, &long);
        assert_eq!(entry.name().len(), DIRENT_NAME_MAX);
        assert!(entry.name().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_read_rewind_close() {
        let pool = ObjectPool::<TestDir>::new(1);
        let dir = DirHandle::new(pool.acquire_dir().unwrap());
        dir.object().borrow_mut().do_open("/d1").unwrap();

        assert_eq!(dir.read().unwrap().unwrap().name(), "file1");
        assert_eq!(dir.read().unwrap().unwrap().name(), "file2");
        assert_eq!(dir.entry().name(), "file2");

        dir.rewind().unwrap();
        assert_eq!(dir.read().unwrap().unwrap().name(), "file1");
        dir.read().unwrap();
        dir.read().unwrap();
        assert!(dir.read().unwrap().is_none());

        assert!(pool.is_in_use(0));
        // Released despite the failing hook
        assert_eq!(dir.close(), Err(VfsError::Other(5)));
        assert!(!pool.is_in_use(0));
        assert!(pool.object(0).unwrap().borrow().closed);
    }

    #[derive(Default)]
    struct Minimal {
        base: DirBase,
    }

    impl Directory for Minimal {
        fn dir_base(&self) -> &DirBase {
            &self.base
        }

        fn dir_base_mut(&mut self) -> &mut DirBase {
            &mut self.base
        }

        fn do_open(&mut self, _dirname: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_hooks() {
        let pool = ObjectPool::<Minimal>::new(1);
        let dir = DirHandle::new(pool.acquire_dir().unwrap());
        assert_eq!(dir.read(), Err(VfsError::NotSupported));
        assert_eq!(dir.rewind(), Err(VfsError::NotSupported));
        assert_eq!(dir.close(), Ok(()));
        assert_eq!(pool.in_use_count(), 0);
    }

    // Copies of a handle could close a stream reopened in the same slot
    static_assertions::assert_not_impl_any!(DirHandle: Clone, Copy);

    #[test]
    fn test_reopened_slot_owned_by_new_handle() {
        let pool = ObjectPool::<TestDir>::new(1);
        let first = DirHandle::new(pool.acquire_dir().unwrap());
        first.object().borrow_mut().do_open("/d1").unwrap();
        let _ = first.close();
        assert!(!pool.is_in_use(0));

        let second = DirHandle::new(pool.acquire_dir().unwrap());
        second.object().borrow_mut().do_open("/d2").unwrap();
        assert!(pool.is_in_use(0));
        assert!(!pool.object(0).unwrap().borrow().closed);
        assert_eq!(second.read().unwrap().unwrap().name(), "file1");

        let _ = second.close();
        assert!(!pool.is_in_use(0));
        assert_eq!(pool.in_use_count(), 0);
    }
}
