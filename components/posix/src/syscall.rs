//! Raw syscall entry point
//!
//! C callers hand over untyped integers and possibly-null buffers. They are
//! decoded here, once, into the typed parameters the dispatch layer takes,
//! and results are folded back into the C convention: a non-negative value
//! on success, -1 with errno set on failure.

use std::net::Shutdown;

use kaal_vfs::{Fd, IoArg, Mode, MountFlags, OpenFlags, Result, VfsError, Whence};

use crate::dispatch::PosixIo;

/// Syscall requests with C-shaped arguments
///
/// `None` stands for a null pointer.
#[derive(Debug)]
pub enum Syscall<'a> {
    Open { path: Option<&'a str>, flags: i32, mode: Mode },
    Close { fd: Fd },
    Read { fd: Fd, buf: Option<&'a mut [u8]> },
    Write { fd: Fd, buf: Option<&'a [u8]> },
    Writev { fd: Fd, iov: Option<&'a [&'a [u8]]> },
    Lseek { fd: Fd, offset: i64, whence: i32 },
    Ioctl { fd: Fd, request: i32, arg: Option<i64> },
    Fcntl { fd: Fd, cmd: i32, arg: Option<i64> },
    Isatty { fd: Fd },
    Ftruncate { fd: Fd, length: i64 },
    Fsync { fd: Fd },
    Chmod { path: Option<&'a str>, mode: Mode },
    Truncate { path: Option<&'a str>, length: i64 },
    Rename { existing: Option<&'a str>, new: Option<&'a str> },
    Unlink { path: Option<&'a str> },
    Mkdir { path: Option<&'a str>, mode: Mode },
    Rmdir { path: Option<&'a str> },
    Umount { path: Option<&'a str>, flags: u32 },
    Sync,
    Socket { domain: i32, kind: i32, protocol: i32 },
    Listen { fd: Fd, backlog: i32 },
    Shutdown { fd: Fd, how: i32 },
    Sockatmark { fd: Fd },
}

fn non_null<T>(ptr: Option<T>) -> Result<T> {
    ptr.ok_or(VfsError::Fault)
}

fn io_arg(arg: Option<i64>) -> IoArg {
    arg.map_or(IoArg::None, IoArg::Int)
}

fn shutdown_how(how: i32) -> Result<Shutdown> {
    match how {
        0 => Ok(Shutdown::Read),
        1 => Ok(Shutdown::Write),
        2 => Ok(Shutdown::Both),
        _ => Err(VfsError::InvalidArgument),
    }
}

fn count(n: usize) -> isize {
    n as isize
}

impl PosixIo {
    /// Execute a raw syscall
    ///
    /// # Returns
    /// The call's result in C convention; on failure -1 with
    /// [`PosixIo::errno`] describing the error. `isatty` returns 1 or 0.
    pub fn handle_syscall(&mut self, syscall: Syscall<'_>) -> isize {
        self.set_last_error(None);
        match self.dispatch(syscall) {
            Ok(ret) => ret,
            Err(err) => {
                self.set_last_error(Some(err));
                -1
            }
        }
    }

    fn dispatch(&mut self, syscall: Syscall<'_>) -> Result<isize> {
        match syscall {
            Syscall::Open { path, flags, mode } => {
                let path = non_null(path)?;
                let flags = OpenFlags::from_bits_retain(flags as u32);
                self.open(path, flags, mode).map(|fd| fd as isize)
            }
            Syscall::Close { fd } => self.close(fd).map(|_| 0),
            Syscall::Read { fd, buf } => {
                let buf = non_null(buf)?;
                self.read(fd, buf).map(count)
            }
            Syscall::Write { fd, buf } => {
                let buf = non_null(buf)?;
                self.write(fd, buf).map(count)
            }
            Syscall::Writev { fd, iov } => {
                let iov = non_null(iov)?;
                self.writev(fd, iov).map(count)
            }
            Syscall::Lseek { fd, offset, whence } => {
                let whence = Whence::try_from(whence)?;
                self.lseek(fd, offset, whence).map(|pos| pos as isize)
            }
            Syscall::Ioctl { fd, request, arg } => {
                self.ioctl(fd, request, io_arg(arg)).map(|ret| ret as isize)
            }
            Syscall::Fcntl { fd, cmd, arg } => {
                self.fcntl(fd, cmd, io_arg(arg)).map(|ret| ret as isize)
            }
            Syscall::Isatty { fd } => match self.isatty(fd) {
                Ok(tty) => Ok(tty as isize),
                // errno keeps ENOTTY
                Err(VfsError::NotATerminal) => Ok(0),
                Err(err) => Err(err),
            },
            Syscall::Ftruncate { fd, length } => self.ftruncate(fd, length).map(|_| 0),
            Syscall::Fsync { fd } => self.fsync(fd).map(|_| 0),
            Syscall::Chmod { path, mode } => {
                let path = non_null(path)?;
                self.chmod(path, mode).map(|_| 0)
            }
            Syscall::Truncate { path, length } => {
                let path = non_null(path)?;
                self.truncate(path, length).map(|_| 0)
            }
            Syscall::Rename { existing, new } => {
                let existing = non_null(existing)?;
                let new = non_null(new)?;
                self.rename(existing, new).map(|_| 0)
            }
            Syscall::Unlink { path } => {
                let path = non_null(path)?;
                self.unlink(path).map(|_| 0)
            }
            Syscall::Mkdir { path, mode } => {
                let path = non_null(path)?;
                self.mkdir(path, mode).map(|_| 0)
            }
            Syscall::Rmdir { path } => {
                let path = non_null(path)?;
                self.rmdir(path).map(|_| 0)
            }
            Syscall::Umount { path, flags } => {
                let path = non_null(path)?;
                self.umount(path, MountFlags::from_bits_retain(flags)).map(|_| 0)
            }
            Syscall::Sync => {
                self.sync();
                Ok(0)
            }
            Syscall::Socket {
                domain,
                kind,
                protocol,
            } => self.socket(domain, kind, protocol).map(|fd| fd as isize),
            Syscall::Listen { fd, backlog } => self.listen(fd, backlog).map(|_| 0),
            Syscall::Shutdown { fd, how } => {
                let how = shutdown_how(how)?;
                self.shutdown(fd, how).map(|_| 0)
            }
            Syscall::Sockatmark { fd } => self.sockatmark(fd).map(|mark| mark as isize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaal_vfs::errno;

    #[test]
    fn test_null_pointers_fault() {
        let mut posix = PosixIo::default();

        assert_eq!(
            posix.handle_syscall(Syscall::Open {
                path: None,
                flags: 0,
                mode: 0
            }),
            -1
        );
        assert_eq!(posix.errno(), errno::EFAULT);

        assert_eq!(posix.handle_syscall(Syscall::Read { fd: 3, buf: None }), -1);
        assert_eq!(posix.errno(), errno::EFAULT);

        assert_eq!(posix.handle_syscall(Syscall::Writev { fd: 3, iov: None }), -1);
        assert_eq!(posix.errno(), errno::EFAULT);

        assert_eq!(
            posix.handle_syscall(Syscall::Rename {
                existing: Some("/a"),
                new: None
            }),
            -1
        );
        assert_eq!(posix.errno(), errno::EFAULT);
    }

    #[test]
    fn test_empty_path() {
        let mut posix = PosixIo::default();
        let ret = posix.handle_syscall(Syscall::Open {
            path: Some(""),
            flags: 0,
            mode: 0,
        });
        assert_eq!(ret, -1);
        assert_eq!(posix.errno(), errno::ENOENT);
    }

    #[test]
    fn test_argument_decoding() {
        let mut posix = PosixIo::default();

        // Descriptor lookup comes after decoding
        let ret = posix.handle_syscall(Syscall::Lseek {
            fd: 3,
            offset: 0,
            whence: 7,
        });
        assert_eq!(ret, -1);
        assert_eq!(posix.errno(), errno::EINVAL);

        let ret = posix.handle_syscall(Syscall::Shutdown { fd: 3, how: 9 });
        assert_eq!(ret, -1);
        assert_eq!(posix.errno(), errno::EINVAL);

        assert_eq!(io_arg(None), IoArg::None);
        assert_eq!(io_arg(Some(876)), IoArg::Int(876));
    }

    #[test]
    fn test_sync_clears_errno() {
        let mut posix = PosixIo::default();
        posix.handle_syscall(Syscall::Close { fd: 3 });
        assert_eq!(posix.errno(), errno::EBADF);

        assert_eq!(posix.handle_syscall(Syscall::Sync), 0);
        assert_eq!(posix.errno(), 0);
    }
}
