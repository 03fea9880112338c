//! The POSIX dispatch context
//!
//! [`PosixIo`] owns the descriptor table, the mount manager, the device
//! registry and the socket pool, and routes every call to the object that
//! implements it. Each call resets the last-error indicator and records the
//! error it fails with, so [`PosixIo::errno`] always describes the most
//! recent call.

use std::net::{Shutdown, SocketAddr};
use std::rc::Rc;

use kaal_vfs::{
    BlockDeviceRef, CharDeviceRef, DeviceRegistry, DirEntry, DirHandle, Fd, FileDescriptorTable,
    FileStat, FileSystem, FsHandle, Io, IoArg, IoRef, Mode, MountFlags, MountManager, MsgFlags,
    OpenFlags, RecvMessage, Resolved, Result, SendMessage, Socket, SocketPool, SocketRef, UTimes,
    VfsError, Whence,
};

use crate::config::{ConfigError, PosixConfig};

/// POSIX I/O context
pub struct PosixIo {
    descriptors: FileDescriptorTable,
    mounts: MountManager,
    devices: DeviceRegistry,
    sockets: Option<Rc<dyn SocketPool>>,
    last_error: Option<VfsError>,
}

impl PosixIo {
    /// Build a context with the given capacities
    ///
    /// # Errors
    /// See [`PosixConfig::validate`]
    pub fn new(config: PosixConfig) -> core::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PosixConfig) -> Self {
        log::info!(
            "posix io: {} descriptors, {} mount points, {} devices",
            config.descriptors,
            config.mounts,
            config.devices
        );
        Self {
            descriptors: FileDescriptorTable::new(config.descriptors),
            mounts: MountManager::new(config.mounts),
            devices: DeviceRegistry::new(config.devices),
            sockets: None,
            last_error: None,
        }
    }

    /// Record the outcome of a call in the last-error indicator
    pub(crate) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = result.as_ref().err().copied();
        if let Some(err) = self.last_error {
            log::trace!("call failed: {} (errno {})", err, err.errno());
        }
        result
    }

    pub(crate) fn set_last_error(&mut self, err: Option<VfsError>) {
        self.last_error = err;
    }

    /// Error of the most recent call, `None` if it succeeded
    pub fn last_error(&self) -> Option<VfsError> {
        self.last_error
    }

    /// POSIX errno of the most recent call, 0 if it succeeded
    pub fn errno(&self) -> i32 {
        self.last_error.map_or(0, VfsError::errno)
    }

    pub fn descriptors(&self) -> &FileDescriptorTable {
        &self.descriptors
    }

    /// Direct table access, e.g. to install the standard streams
    pub fn descriptors_mut(&mut self) -> &mut FileDescriptorTable {
        &mut self.descriptors
    }

    pub fn mounts(&self) -> &MountManager {
        &self.mounts
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.devices
    }

    /// Pool that `socket` and `accept` draw from
    pub fn set_socket_pool(&mut self, pool: Rc<dyn SocketPool>) {
        self.sockets = Some(pool);
    }

    pub fn socket_pool(&self) -> Option<Rc<dyn SocketPool>> {
        self.sockets.clone()
    }

    // ---------------------------------------------------------------------
    // Filesystems

    pub fn set_root(
        &mut self,
        fs: FsHandle,
        block_device: Option<BlockDeviceRef>,
        flags: MountFlags,
    ) -> Result<()> {
        let result = self.mounts.set_root(fs, block_device, flags);
        self.track(result)
    }

    pub fn mount(
        &mut self,
        fs: FsHandle,
        path: &str,
        block_device: Option<BlockDeviceRef>,
        flags: MountFlags,
    ) -> Result<()> {
        let result = self.mounts.mount(fs, path, block_device, flags);
        self.track(result)
    }

    pub fn umount(&mut self, path: &str, flags: MountFlags) -> Result<()> {
        let result = self.mounts.umount(path, flags);
        self.track(result)
    }

    pub fn register_device(&mut self, device: CharDeviceRef) -> Result<()> {
        let result = self.devices.register(device);
        self.track(result)
    }

    fn resolve<'p>(&self, path: &'p str, secondary: Option<&'p str>) -> Result<Resolved<'p>> {
        if path.is_empty() || secondary.map_or(false, str::is_empty) {
            return Err(VfsError::NoSuchEntity);
        }
        self.mounts
            .identify(path, secondary)
            .ok_or(VfsError::BadFileDescriptor)
    }

    fn with_fs<T>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut dyn FileSystem, &str) -> Result<T>,
    ) -> Result<T> {
        let result = self.resolve(path, None).and_then(|resolved| {
            let mut fs = resolved.fs.borrow_mut();
            f(&mut *fs, resolved.path)
        });
        self.track(result)
    }

    /// Open `path`, returning a new descriptor
    ///
    /// Paths under [`kaal_vfs::config::DEVICE_PREFIX`] naming a registered
    /// device open that device. Anything else is resolved through the mount
    /// manager and opened by the owning filesystem with the prefix stripped.
    ///
    /// # Errors
    /// - [`VfsError::NoSuchEntity`] for an empty path
    /// - [`VfsError::BadFileDescriptor`] if no filesystem owns the path
    /// - [`VfsError::TooManyOpenFiles`] if the file pool or descriptor table is full
    /// - Whatever the open hook reports
    pub fn open(&mut self, path: &str, flags: OpenFlags, mode: Mode) -> Result<Fd> {
        let result = self
            .open_io(path, flags, mode)
            .and_then(|io| io.register(&mut self.descriptors));
        self.track(result)
    }

    fn open_io(&self, path: &str, flags: OpenFlags, mode: Mode) -> Result<IoRef> {
        if path.is_empty() {
            return Err(VfsError::NoSuchEntity);
        }

        if let Some(device) = self.devices.identify(path) {
            let opened = device.borrow_mut().do_open(path, flags, mode);
            opened?;
            return Ok(IoRef::Device(device));
        }

        let resolved = self.resolve(path, None)?;
        let file = resolved.fs.borrow_mut().open(resolved.path, flags, mode)?;
        Ok(IoRef::File(file))
    }

    pub fn opendir(&mut self, dirname: &str) -> Result<DirHandle> {
        self.with_fs(dirname, |fs, path| fs.opendir(path))
    }

    /// Next entry of `dir`, `None` at end of stream
    pub fn readdir(&mut self, dir: &DirHandle) -> Result<Option<DirEntry>> {
        let result = dir.read();
        self.track(result)
    }

    pub fn rewinddir(&mut self, dir: &DirHandle) -> Result<()> {
        let result = dir.rewind();
        self.track(result)
    }

    pub fn closedir(&mut self, dir: DirHandle) -> Result<()> {
        let result = dir.close();
        self.track(result)
    }

    pub fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_chmod(path, mode))
    }

    pub fn stat(&mut self, path: &str) -> Result<FileStat> {
        self.with_fs(path, |fs, path| fs.do_stat(path))
    }

    pub fn truncate(&mut self, path: &str, length: i64) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_truncate(path, length))
    }

    /// Rename `existing` to `new`
    ///
    /// Both paths are stripped of the mount prefix of `existing`; a `new`
    /// outside that mount point reaches the hook unchanged.
    pub fn rename(&mut self, existing: &str, new: &str) -> Result<()> {
        let result = self.resolve(existing, Some(new)).and_then(|resolved| {
            let target = resolved.secondary.unwrap_or(new);
            let mut fs = resolved.fs.borrow_mut();
            fs.do_rename(resolved.path, target)
        });
        self.track(result)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_unlink(path))
    }

    pub fn utime(&mut self, path: &str, times: Option<&UTimes>) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_utime(path, times))
    }

    pub fn mkdir(&mut self, path: &str, mode: Mode) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_mkdir(path, mode))
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.with_fs(path, |fs, path| fs.do_rmdir(path))
    }

    /// Sync every mounted filesystem and the root
    pub fn sync(&mut self) {
        self.mounts.sync_all();
        self.last_error = None;
    }

    // ---------------------------------------------------------------------
    // Descriptors

    fn io(&self, fd: Fd) -> Result<IoRef> {
        self.descriptors.io(fd).ok_or(VfsError::BadFileDescriptor)
    }

    fn with_io<T>(&mut self, fd: Fd, f: impl FnOnce(&mut dyn Io) -> Result<T>) -> Result<T> {
        let result = self.io(fd).and_then(|io| io.with(f));
        self.track(result)
    }

    /// Close `fd`
    ///
    /// The descriptor is freed and the object returned to its pool even if
    /// the close hook fails; the hook's error is still reported.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let result = self
            .io(fd)
            .and_then(|io| io.close(&mut self.descriptors));
        self.track(result)
    }

    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.with_io(fd, |io| io.do_read(buf))
    }

    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        self.with_io(fd, |io| io.do_write(buf))
    }

    /// Gather write
    ///
    /// # Errors
    /// [`VfsError::InvalidArgument`] for an empty buffer list
    pub fn writev(&mut self, fd: Fd, iov: &[&[u8]]) -> Result<usize> {
        self.with_io(fd, |io| {
            if iov.is_empty() {
                return Err(VfsError::InvalidArgument);
            }
            io.do_writev(iov)
        })
    }

    pub fn ioctl(&mut self, fd: Fd, request: i32, arg: IoArg) -> Result<i32> {
        self.with_io(fd, |io| io.do_ioctl(request, arg))
    }

    pub fn lseek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<i64> {
        self.with_io(fd, |io| io.do_lseek(offset, whence))
    }

    /// Whether `fd` refers to a terminal
    ///
    /// # Errors
    /// [`VfsError::NotATerminal`] from the default hook
    pub fn isatty(&mut self, fd: Fd) -> Result<bool> {
        self.with_io(fd, |io| io.do_isatty())
    }

    pub fn fcntl(&mut self, fd: Fd, cmd: i32, arg: IoArg) -> Result<i32> {
        self.with_io(fd, |io| io.do_fcntl(cmd, arg))
    }

    pub fn fstat(&mut self, fd: Fd) -> Result<FileStat> {
        self.with_io(fd, |io| io.do_fstat())
    }

    pub fn ftruncate(&mut self, fd: Fd, length: i64) -> Result<()> {
        self.with_io(fd, |io| io.do_ftruncate(length))
    }

    pub fn fsync(&mut self, fd: Fd) -> Result<()> {
        self.with_io(fd, |io| io.do_fsync())
    }

    /// Close every bound descriptor, returning how many were closed
    pub fn close_all(&mut self) -> usize {
        let open: Vec<IoRef> = self.descriptors.bound().map(|(_, io)| io.clone()).collect();
        for io in &open {
            if let Err(err) = io.close(&mut self.descriptors) {
                log::warn!("close of {:?} failed: {}", io.kind(), err);
            }
        }
        self.last_error = None;
        open.len()
    }

    // ---------------------------------------------------------------------
    // Sockets

    /// Create a socket, returning its descriptor
    ///
    /// # Errors
    /// - [`VfsError::TooManyOpenFiles`] if there is no socket pool or it is exhausted
    /// - Whatever the socket hook reports; the socket is closed and released
    pub fn socket(&mut self, domain: i32, kind: i32, protocol: i32) -> Result<Fd> {
        let result = self.open_socket(domain, kind, protocol);
        self.track(result)
    }

    fn open_socket(&mut self, domain: i32, kind: i32, protocol: i32) -> Result<Fd> {
        let pool = self.sockets.clone().ok_or(VfsError::TooManyOpenFiles)?;
        let sock = pool.acquire_socket().ok_or(VfsError::TooManyOpenFiles)?;
        let io = IoRef::Socket(sock.clone());

        let created = sock.borrow_mut().do_socket(domain, kind, protocol);
        if let Err(err) = created {
            if let Err(close_err) = io.close(&mut self.descriptors) {
                log::debug!("close of unusable socket failed: {}", close_err);
            }
            return Err(err);
        }

        io.register(&mut self.descriptors)
    }

    fn socket_of(&self, fd: Fd) -> Result<SocketRef> {
        let io = self.io(fd)?;
        io.as_socket().map(Rc::clone)
    }

    fn with_socket<T>(
        &mut self,
        fd: Fd,
        f: impl FnOnce(&mut dyn Socket) -> Result<T>,
    ) -> Result<T> {
        let result = self.socket_of(fd).and_then(|sock| {
            let mut sock = sock.borrow_mut();
            f(&mut *sock)
        });
        self.track(result)
    }

    /// Accept a connection on the listening socket `fd`
    ///
    /// # Returns
    /// The descriptor of the connected socket and the peer address, if known
    ///
    /// # Errors
    /// - [`VfsError::ProcessLimit`] if there is no socket pool or it is exhausted
    /// - Whatever the accept hook reports; the new socket is released
    pub fn accept(&mut self, fd: Fd) -> Result<(Fd, Option<SocketAddr>)> {
        let result = self.accept_socket(fd);
        self.track(result)
    }

    fn accept_socket(&mut self, fd: Fd) -> Result<(Fd, Option<SocketAddr>)> {
        let listener = self.socket_of(fd)?;
        let pool = self.sockets.clone().ok_or(VfsError::ProcessLimit)?;
        let new = pool.acquire_socket().ok_or(VfsError::ProcessLimit)?;
        let io = IoRef::Socket(new.clone());

        let accepted = {
            let mut conn = new.borrow_mut();
            let mut listener = listener.borrow_mut();
            listener.do_accept(&mut *conn)
        };
        match accepted {
            Ok(peer) => Ok((io.register(&mut self.descriptors)?, peer)),
            Err(err) => {
                io.release();
                Err(err)
            }
        }
    }

    pub fn bind(&mut self, fd: Fd, addr: &SocketAddr) -> Result<()> {
        self.with_socket(fd, |sock| sock.do_bind(addr))
    }

    pub fn connect(&mut self, fd: Fd, addr: &SocketAddr) -> Result<()> {
        self.with_socket(fd, |sock| sock.do_connect(addr))
    }

    pub fn listen(&mut self, fd: Fd, backlog: i32) -> Result<()> {
        self.with_socket(fd, |sock| sock.do_listen(backlog))
    }

    pub fn getpeername(&mut self, fd: Fd) -> Result<SocketAddr> {
        self.with_socket(fd, |sock| sock.do_getpeername())
    }

    pub fn getsockname(&mut self, fd: Fd) -> Result<SocketAddr> {
        self.with_socket(fd, |sock| sock.do_getsockname())
    }

    /// Copy an option value into `value`, returning its length
    pub fn getsockopt(&mut self, fd: Fd, level: i32, name: i32, value: &mut [u8]) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_getsockopt(level, name, value))
    }

    pub fn setsockopt(&mut self, fd: Fd, level: i32, name: i32, value: &[u8]) -> Result<()> {
        self.with_socket(fd, |sock| sock.do_setsockopt(level, name, value))
    }

    pub fn recv(&mut self, fd: Fd, buf: &mut [u8], flags: MsgFlags) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_recv(buf, flags))
    }

    pub fn recvfrom(
        &mut self,
        fd: Fd,
        buf: &mut [u8],
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>)> {
        self.with_socket(fd, |sock| sock.do_recvfrom(buf, flags))
    }

    pub fn recvmsg(&mut self, fd: Fd, msg: &mut RecvMessage<'_, '_>, flags: MsgFlags) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_recvmsg(msg, flags))
    }

    pub fn send(&mut self, fd: Fd, buf: &[u8], flags: MsgFlags) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_send(buf, flags))
    }

    pub fn sendto(&mut self, fd: Fd, buf: &[u8], flags: MsgFlags, to: &SocketAddr) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_sendto(buf, flags, to))
    }

    pub fn sendmsg(&mut self, fd: Fd, msg: &SendMessage<'_>, flags: MsgFlags) -> Result<usize> {
        self.with_socket(fd, |sock| sock.do_sendmsg(msg, flags))
    }

    pub fn shutdown(&mut self, fd: Fd, how: Shutdown) -> Result<()> {
        self.with_socket(fd, |sock| sock.do_shutdown(how))
    }

    pub fn sockatmark(&mut self, fd: Fd) -> Result<bool> {
        self.with_socket(fd, |sock| sock.do_sockatmark())
    }
}

impl Default for PosixIo {
    fn default() -> Self {
        Self::build(PosixConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_io_creation() {
        let posix = PosixIo::default();
        assert_eq!(posix.descriptors().capacity(), 10);
        assert_eq!(posix.mounts().capacity(), 4);
        assert_eq!(posix.devices().capacity(), 8);
        assert_eq!(posix.errno(), 0);
        assert!(posix.socket_pool().is_none());
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = PosixConfig {
            descriptors: 2,
            ..PosixConfig::default()
        };
        assert!(PosixIo::new(config).is_err());
    }

    #[test]
    fn test_path_errors() {
        let mut posix = PosixIo::default();

        assert_eq!(posix.open("", OpenFlags::RDONLY, 0), Err(VfsError::NoSuchEntity));
        assert_eq!(posix.errno(), 2);

        // Nothing mounted, no root
        assert_eq!(
            posix.open("/fs1/f1", OpenFlags::RDONLY, 0),
            Err(VfsError::BadFileDescriptor)
        );
        assert_eq!(posix.errno(), 9);
        assert_eq!(posix.chmod("/x", 0), Err(VfsError::BadFileDescriptor));
        assert_eq!(posix.rename("/x", ""), Err(VfsError::NoSuchEntity));

        posix.sync();
        assert_eq!(posix.errno(), 0);
    }

    #[test]
    fn test_descriptor_errors() {
        let mut posix = PosixIo::default();
        let mut buf = [0u8; 4];

        assert_eq!(posix.read(3, &mut buf), Err(VfsError::BadFileDescriptor));
        assert_eq!(posix.write(-1, &buf), Err(VfsError::BadFileDescriptor));
        assert_eq!(posix.close(99), Err(VfsError::BadFileDescriptor));
        assert_eq!(posix.listen(3, 1), Err(VfsError::BadFileDescriptor));
        assert_eq!(posix.last_error(), Some(VfsError::BadFileDescriptor));
    }

    #[test]
    fn test_socket_without_pool() {
        let mut posix = PosixIo::default();
        assert_eq!(posix.socket(2, 1, 0), Err(VfsError::TooManyOpenFiles));
        assert_eq!(posix.errno(), 23);
    }
}
