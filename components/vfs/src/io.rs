//! Generic I/O objects
//!
//! Every open resource (character device, regular file, socket) implements
//! [`Io`]. The trait carries the descriptor-level hooks with POSIX default
//! behaviour; capability traits ([`CharDevice`], [`File`], [`Socket`]) refine
//! it with their own hooks.
//!
//! Objects are shared through [`IoRef`], the handle stored in the
//! descriptor table. It knows the object's capability and drives the
//! register and close sequences that keep the table, the object and its
//! pool slot consistent.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use crate::device::CharDevice;
use crate::error::{Result, VfsError};
use crate::fd_table::FileDescriptorTable;
use crate::file::File;
use crate::pool::PoolLink;
use crate::socket::Socket;
use crate::types::{Fd, FileStat, IoArg, Whence};

/// State shared by all I/O objects
#[derive(Default)]
pub struct IoBase {
    /// Descriptor currently bound to this object
    pub(crate) fd: Option<Fd>,
    /// Pool the object was acquired from, if any
    pub(crate) link: PoolLink,
}

impl IoBase {
    /// Descriptor bound to the object, `None` when closed
    pub fn fd(&self) -> Option<Fd> {
        self.fd
    }

    /// Pool back-reference
    pub fn link_mut(&mut self) -> &mut PoolLink {
        &mut self.link
    }
}

/// Upcast from a capability trait object to `dyn Io`
///
/// Implemented for every sized [`Io`] type, so `dyn File`, `dyn Socket` and
/// `dyn CharDevice` can all be viewed as plain I/O objects.
pub trait AsIo {
    fn as_io(&self) -> &dyn Io;
    fn as_io_mut(&mut self) -> &mut dyn Io;
}

impl<T: Io> AsIo for T {
    fn as_io(&self) -> &dyn Io {
        self
    }

    fn as_io_mut(&mut self) -> &mut dyn Io {
        self
    }
}

/// Descriptor-level operations of an open resource
///
/// All hooks have POSIX-compatible defaults: unimplemented operations fail
/// with [`VfsError::NotSupported`], `do_close` succeeds and `do_isatty`
/// reports [`VfsError::NotATerminal`].
pub trait Io: AsIo {
    fn io_base(&self) -> &IoBase;
    fn io_base_mut(&mut self) -> &mut IoBase;

    /// Release implementation resources
    ///
    /// Runs on every close, even when the caller ignores the result.
    fn do_close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read into `buf`, returning the number of bytes read
    fn do_read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    /// Write `buf`, returning the number of bytes written
    fn do_write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    /// Gather write
    ///
    /// The default issues one `do_write` per buffer and stops at the first
    /// error. It is not atomic.
    fn do_writev(&mut self, iov: &[&[u8]]) -> Result<usize> {
        let mut total = 0;
        for buf in iov {
            total += self.do_write(buf)?;
        }
        Ok(total)
    }

    fn do_ioctl(&mut self, _request: i32, _arg: IoArg) -> Result<i32> {
        Err(VfsError::NotSupported)
    }

    /// Reposition the offset, returning the new offset from the start
    fn do_lseek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
        Err(VfsError::NotSupported)
    }

    fn do_isatty(&mut self) -> Result<bool> {
        Err(VfsError::NotATerminal)
    }

    fn do_fcntl(&mut self, _cmd: i32, _arg: IoArg) -> Result<i32> {
        Err(VfsError::NotSupported)
    }

    fn do_fstat(&mut self) -> Result<FileStat> {
        Err(VfsError::NotSupported)
    }

    fn do_ftruncate(&mut self, _length: i64) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_fsync(&mut self) -> Result<()> {
        Err(VfsError::NotSupported)
    }
}

/// Capability of an open resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Device,
    File,
    Socket,
}

/// Shared handle to an open resource
#[derive(Clone)]
pub enum IoRef {
    Device(Rc<RefCell<dyn CharDevice>>),
    File(Rc<RefCell<dyn File>>),
    Socket(Rc<RefCell<dyn Socket>>),
}

impl IoRef {
    pub fn kind(&self) -> IoKind {
        match self {
            IoRef::Device(_) => IoKind::Device,
            IoRef::File(_) => IoKind::File,
            IoRef::Socket(_) => IoKind::Socket,
        }
    }

    /// Run `f` with exclusive access to the object
    ///
    /// # Panics
    /// If the object is already borrowed, i.e. a hook re-entered the
    /// dispatch layer for its own descriptor.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Io) -> R) -> R {
        match self {
            IoRef::Device(dev) => f(dev.borrow_mut().as_io_mut()),
            IoRef::File(file) => f(file.borrow_mut().as_io_mut()),
            IoRef::Socket(sock) => f(sock.borrow_mut().as_io_mut()),
        }
    }

    fn with_ref<R>(&self, f: impl FnOnce(&dyn Io) -> R) -> R {
        match self {
            IoRef::Device(dev) => f(dev.borrow().as_io()),
            IoRef::File(file) => f(file.borrow().as_io()),
            IoRef::Socket(sock) => f(sock.borrow().as_io()),
        }
    }

    /// Descriptor bound to the object, `None` when unbound
    pub fn fd(&self) -> Option<Fd> {
        self.with_ref(|io| io.io_base().fd)
    }

    pub(crate) fn set_fd(&self, fd: Option<Fd>) {
        self.with(|io| io.io_base_mut().fd = fd);
    }

    /// Address of the object's storage, used as its identity
    pub fn addr(&self) -> *const () {
        match self {
            IoRef::Device(dev) => Rc::as_ptr(dev) as *const (),
            IoRef::File(file) => Rc::as_ptr(file) as *const (),
            IoRef::Socket(sock) => Rc::as_ptr(sock) as *const (),
        }
    }

    /// Whether both handles refer to the same object
    pub fn same(&self, other: &IoRef) -> bool {
        self.addr() == other.addr()
    }

    /// The socket behind this handle
    ///
    /// # Errors
    /// [`VfsError::NotASocket`] for devices and files
    pub fn as_socket(&self) -> Result<&Rc<RefCell<dyn Socket>>> {
        match self {
            IoRef::Socket(sock) => Ok(sock),
            _ => Err(VfsError::NotASocket),
        }
    }

    /// Return the object to the pool it was acquired from
    ///
    /// Devices and other unpooled objects are unaffected.
    pub fn release(&self) -> bool {
        let addr = self.addr();
        self.with(|io| io.io_base_mut().link.release(addr))
    }

    /// Bind the object to the lowest free descriptor
    ///
    /// When the table rejects the object, its close hook runs so the open
    /// performed by the caller is undone. An object rejected for lack of
    /// space also has its descriptor cleared and its pool slot returned. An
    /// object that is already bound ([`VfsError::Busy`]) keeps its existing
    /// binding.
    ///
    /// # Returns
    /// The new descriptor
    pub fn register(&self, table: &mut FileDescriptorTable) -> Result<Fd> {
        let err = match table.alloc(self) {
            Ok(fd) => return Ok(fd),
            Err(err) => err,
        };

        log::debug!("rolling back open of {:?}: {}", self.kind(), err);
        if let Err(close_err) = self.with(|io| io.do_close()) {
            log::debug!("close hook failed during rollback: {}", close_err);
        }
        if err != VfsError::Busy {
            self.set_fd(None);
            self.release();
        }
        Err(err)
    }

    /// Close the object
    ///
    /// The close hook always runs first. The descriptor binding is removed
    /// and the pool slot returned regardless of the hook's result, which is
    /// then reported to the caller.
    pub fn close(&self, table: &mut FileDescriptorTable) -> Result<()> {
        let result = self.with(|io| io.do_close());

        if let Some(fd) = self.fd() {
            if table.free(fd).is_err() {
                log::warn!("descriptor {} was not bound in the table", fd);
            }
        }
        self.set_fd(None);
        self.release();

        result
    }
}

impl PartialEq for IoRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for IoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRef")
            .field("kind", &self.kind())
            .field("addr", &self.addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ObjectPool;
    use crate::types::{Mode, OpenFlags};

    #[derive(Default)]
    struct Plain {
        base: IoBase,
        written: Vec<u8>,
        closes: u32,
        fail_close: bool,
    }

    impl Io for Plain {
        fn io_base(&self) -> &IoBase {
            &self.base
        }

        fn io_base_mut(&mut self) -> &mut IoBase {
            &mut self.base
        }

        fn do_close(&mut self) -> Result<()> {
            self.closes += 1;
            if self.fail_close {
                Err(VfsError::Other(5))
            } else {
                Ok(())
            }
        }

        fn do_write(&mut self, buf: &[u8]) -> Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    impl File for Plain {
        fn do_open(&mut self, _path: &str, _flags: OpenFlags, _mode: Mode) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Bare {
        base: IoBase,
    }

    impl Io for Bare {
        fn io_base(&self) -> &IoBase {
            &self.base
        }

        fn io_base_mut(&mut self) -> &mut IoBase {
            &mut self.base
        }
    }

    fn pooled(pool: &Rc<ObjectPool<Plain>>) -> (Rc<RefCell<Plain>>, IoRef) {
        let obj = pool.acquire().unwrap();
        obj.borrow_mut().base.link.attach(pool.owner());
        let io = IoRef::File(obj.clone());
        (obj, io)
    }

    #[test]
    fn test_default_hooks() {
        let mut io = Bare::default();
        let mut buf = [0u8; 4];

        assert_eq!(io.do_close(), Ok(()));
        assert_eq!(io.do_read(&mut buf), Err(VfsError::NotSupported));
        assert_eq!(io.do_write(&buf), Err(VfsError::NotSupported));
        assert_eq!(io.do_writev(&[&buf[..]]), Err(VfsError::NotSupported));
        assert_eq!(io.do_ioctl(1, IoArg::None), Err(VfsError::NotSupported));
        assert_eq!(io.do_lseek(0, Whence::Set), Err(VfsError::NotSupported));
        assert_eq!(io.do_isatty(), Err(VfsError::NotATerminal));
        assert_eq!(io.do_fcntl(1, IoArg::Int(2)), Err(VfsError::NotSupported));
        assert_eq!(io.do_fstat(), Err(VfsError::NotSupported));
        assert_eq!(io.do_ftruncate(0), Err(VfsError::NotSupported));
        assert_eq!(io.do_fsync(), Err(VfsError::NotSupported));
    }

    #[test]
    fn test_writev_loops_over_write() {
        let mut io = Plain::default();
        let n = io.do_writev(&[&b"ab"[..], &b""[..], &b"cde"[..]]).unwrap();
        assert_eq!(n, 5);
        assert_eq!(io.written, b"abcde");
    }

    #[test]
    fn test_register_and_close() {
        let pool = ObjectPool::<Plain>::new(1);
        let mut table = FileDescriptorTable::new(5);
        let (obj, io) = pooled(&pool);

        let fd = io.register(&mut table).unwrap();
        assert_eq!(fd, 3);
        assert_eq!(io.fd(), Some(3));

        io.close(&mut table).unwrap();
        assert_eq!(obj.borrow().closes, 1);
        assert_eq!(io.fd(), None);
        assert!(table.io(3).is_none());
        assert!(!pool.is_in_use(0));
    }

    #[test]
    fn test_close_releases_slot_on_hook_failure() {
        let pool = ObjectPool::<Plain>::new(1);
        let mut table = FileDescriptorTable::new(5);
        let (obj, io) = pooled(&pool);
        obj.borrow_mut().fail_close = true;

        io.register(&mut table).unwrap();
        assert_eq!(io.close(&mut table), Err(VfsError::Other(5)));
        assert!(!table.is_valid(3));
        assert!(!pool.is_in_use(0));
    }

    #[test]
    fn test_register_failure_cleans_up() {
        let pool = ObjectPool::<Plain>::new(1);
        // Only the reserved descriptors, nothing to hand out
        let mut table = FileDescriptorTable::new(3);
        let (obj, io) = pooled(&pool);

        assert_eq!(io.register(&mut table), Err(VfsError::TooManyOpenFiles));
        assert_eq!(obj.borrow().closes, 1);
        assert_eq!(io.fd(), None);
        assert!(!pool.is_in_use(0));
    }

    #[test]
    fn test_register_twice_keeps_binding() {
        let pool = ObjectPool::<Plain>::new(1);
        let mut table = FileDescriptorTable::new(5);
        let (obj, io) = pooled(&pool);

        io.register(&mut table).unwrap();
        assert_eq!(io.register(&mut table), Err(VfsError::Busy));
        assert_eq!(io.fd(), Some(3));
        assert_eq!(obj.borrow().closes, 1);
        assert_eq!(table.io(3), Some(io.clone()));
        assert!(pool.is_in_use(0));
    }

    #[test]
    fn test_as_socket() {
        let file: Rc<RefCell<dyn File>> = Rc::new(RefCell::new(Plain::default()));
        assert_eq!(
            IoRef::File(file).as_socket().err(),
            Some(VfsError::NotASocket)
        );
    }
}
