//! Sockets
//!
//! Socket objects come from a dedicated socket pool rather than from a
//! filesystem. Addresses are carried as [`SocketAddr`]; the protocol work
//! itself is left entirely to the hooks.

use core::cell::RefCell;
use std::net::{Shutdown, SocketAddr};
use std::rc::Rc;

use crate::error::{Result, VfsError};
use crate::io::Io;
use crate::pool::ObjectPool;
use crate::types::{MsgFlags, RecvMessage, SendMessage};

/// A socket
///
/// Every hook fails with [`VfsError::NotSupported`] unless overridden.
pub trait Socket: Io {
    /// Initialize a freshly acquired socket
    fn do_socket(&mut self, _domain: i32, _kind: i32, _protocol: i32) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    /// Accept a pending connection into `new`
    ///
    /// # Arguments
    /// * `new` - Socket acquired from the pool for the connection
    ///
    /// # Returns
    /// The peer address, when known
    fn do_accept(&mut self, _new: &mut dyn Socket) -> Result<Option<SocketAddr>> {
        Err(VfsError::NotSupported)
    }

    fn do_bind(&mut self, _addr: &SocketAddr) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_connect(&mut self, _addr: &SocketAddr) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_getpeername(&mut self) -> Result<SocketAddr> {
        Err(VfsError::NotSupported)
    }

    fn do_getsockname(&mut self) -> Result<SocketAddr> {
        Err(VfsError::NotSupported)
    }

    /// Copy option `name` at `level` into `value`, returning its length
    fn do_getsockopt(&mut self, _level: i32, _name: i32, _value: &mut [u8]) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn do_setsockopt(&mut self, _level: i32, _name: i32, _value: &[u8]) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_listen(&mut self, _backlog: i32) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    fn do_recv(&mut self, _buf: &mut [u8], _flags: MsgFlags) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    /// Receive into `buf`, returning the length and the source address
    fn do_recvfrom(
        &mut self,
        _buf: &mut [u8],
        _flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>)> {
        Err(VfsError::NotSupported)
    }

    fn do_recvmsg(&mut self, _msg: &mut RecvMessage<'_, '_>, _flags: MsgFlags) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn do_send(&mut self, _buf: &[u8], _flags: MsgFlags) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn do_sendmsg(&mut self, _msg: &SendMessage<'_>, _flags: MsgFlags) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn do_sendto(&mut self, _buf: &[u8], _flags: MsgFlags, _to: &SocketAddr) -> Result<usize> {
        Err(VfsError::NotSupported)
    }

    fn do_shutdown(&mut self, _how: Shutdown) -> Result<()> {
        Err(VfsError::NotSupported)
    }

    /// Whether the read position is at the out-of-band mark
    fn do_sockatmark(&mut self) -> Result<bool> {
        Err(VfsError::NotSupported)
    }
}

pub type SocketRef = Rc<RefCell<dyn Socket>>;

/// Source of socket objects
pub trait SocketPool {
    fn acquire_socket(&self) -> Option<SocketRef>;
}

impl<T: Socket + 'static> SocketPool for ObjectPool<T> {
    fn acquire_socket(&self) -> Option<SocketRef> {
        let sock = self.acquire()?;
        sock.borrow_mut().io_base_mut().link.attach(self.owner());
        let sock: SocketRef = sock;
        Some(sock)
    }
}
