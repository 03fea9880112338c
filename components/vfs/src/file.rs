//! Regular files
//!
//! File objects are drawn from a filesystem's file pool on every open and
//! returned to it on close.

use core::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::io::Io;
use crate::pool::ObjectPool;
use crate::types::{Mode, OpenFlags};

/// A regular file
pub trait File: Io {
    /// Open `path` on the owning filesystem
    ///
    /// The pool does not reset objects between uses; this hook must
    /// reinitialize any state left from a previous open.
    ///
    /// # Arguments
    /// * `path` - Filesystem-relative path, with a leading `/`
    /// * `flags` - Open flags as passed by the caller
    /// * `mode` - Permission bits as passed by the caller
    fn do_open(&mut self, path: &str, flags: OpenFlags, mode: Mode) -> Result<()>;
}

pub type FileRef = Rc<RefCell<dyn File>>;

/// Source of file objects for a filesystem
pub trait FilePool {
    /// Acquire a free file object, linked back to this pool
    fn acquire_file(&self) -> Option<FileRef>;
}

impl<T: File + 'static> FilePool for ObjectPool<T> {
    fn acquire_file(&self) -> Option<FileRef> {
        let file = self.acquire()?;
        file.borrow_mut().io_base_mut().link.attach(self.owner());
        let file: FileRef = file;
        Some(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoBase, IoRef};

    #[derive(Default)]
    struct TestFile {
        base: IoBase,
        opens: u32,
    }

    impl Io for TestFile {
        fn io_base(&self) -> &IoBase {
            &self.base
        }

        fn io_base_mut(&mut self) -> &mut IoBase {
            &mut self.base
        }
    }

    impl File for TestFile {
        fn do_open(&mut self, _path: &str, _flags: OpenFlags, _mode: Mode) -> Result<()> {
            self.opens += 1;
            Ok(())
        }
    }

    #[test]
    fn test_acquire_links_to_pool() {
        let pool = ObjectPool::<TestFile>::new(1);
        let files: Rc<dyn FilePool> = pool.clone();

        let file = files.acquire_file().unwrap();
        assert!(file.borrow().io_base().link.is_attached());
        assert!(files.acquire_file().is_none());

        assert!(IoRef::File(file).release());
        assert!(!pool.is_in_use(0));
        assert!(files.acquire_file().is_some());
    }

    #[test]
    fn test_slot_state_survives_release() {
        let pool = ObjectPool::<TestFile>::new(1);
        let file = pool.acquire_file().unwrap();
        file.borrow_mut()
            .do_open("/f1", OpenFlags::RDONLY, 0)
            .unwrap();

        IoRef::File(file).release();
        let again = pool.object(0).unwrap();
        assert_eq!(again.borrow().opens, 1);
    }
}
