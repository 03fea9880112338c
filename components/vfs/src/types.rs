//! Typed call parameters
//!
//! C-style variadic arguments (open mode, ioctl/fcntl argument, seek origin)
//! are decoded once by the dispatch layer into these types before any hook
//! sees them.

use core::convert::TryFrom;

use bitflags::bitflags;

use crate::error::VfsError;

/// A file descriptor
pub type Fd = i32;

/// Permission bits passed to `open`, `chmod` and `mkdir`
pub type Mode = u32;

bitflags! {
    /// File open flags
    ///
    /// Bits not named here are kept by `from_bits_retain` and reach the hook.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0x0000;
        const WRONLY = 0x0001;
        const RDWR = 0x0002;
        const APPEND = 0x0008;
        const CREAT = 0x0200;
        const TRUNC = 0x0400;
        const EXCL = 0x0800;
        const NONBLOCK = 0x4000;
    }
}

bitflags! {
    /// Mount and unmount flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MountFlags: u32 {
        const RDONLY = 0x0001;
        const FORCE = 0x0002;
        const SYNCHRONOUS = 0x0010;
    }
}

bitflags! {
    /// Flags for socket send/receive calls
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MsgFlags: u32 {
        const OOB = 0x0001;
        const PEEK = 0x0002;
        const DONTROUTE = 0x0004;
        const TRUNC = 0x0010;
        const DONTWAIT = 0x0040;
        const WAITALL = 0x0100;
        const NOSIGNAL = 0x4000;
    }
}

/// Origin of a seek operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the file
    Set,
    /// Relative to the current position
    Current,
    /// Relative to the end of the file
    End,
}

impl TryFrom<i32> for Whence {
    type Error = VfsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => Err(VfsError::InvalidArgument),
        }
    }
}

/// The optional third argument of `ioctl` and `fcntl`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoArg {
    #[default]
    None,
    Int(i64),
}

impl IoArg {
    /// The integer argument, if one was supplied
    pub fn as_int(self) -> Option<i64> {
        match self {
            IoArg::None => None,
            IoArg::Int(v) => Some(v),
        }
    }
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: Mode,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blksize: u32,
    pub blocks: u64,
}

/// Access and modification times for `utime`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UTimes {
    pub actime: i64,
    pub modtime: i64,
}

/// Message descriptor for `sendmsg`
#[derive(Debug, Clone, Copy)]
pub struct SendMessage<'a> {
    /// Destination, or `None` for connected sockets
    pub name: Option<std::net::SocketAddr>,
    /// Scatter list
    pub iov: &'a [&'a [u8]],
}

/// Message descriptor for `recvmsg`
#[derive(Debug)]
pub struct RecvMessage<'a, 'b> {
    /// Filled with the source address by the hook
    pub name: Option<std::net::SocketAddr>,
    /// Gather list
    pub iov: &'a mut [&'b mut [u8]],
    /// Filled with result flags (e.g. `MsgFlags::TRUNC`) by the hook
    pub flags: MsgFlags,
}
