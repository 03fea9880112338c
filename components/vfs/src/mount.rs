//! Mount manager
//!
//! Bounded table of mount points plus one distinguished root filesystem.
//! Mount paths start and end with `/`. A path is resolved to the filesystem
//! whose mount path is its longest byte-wise prefix; the prefix is then
//! stripped, keeping its trailing `/` as the new leading separator, so
//! `/fs1/babu` on `/fs1/` becomes `/babu`. Paths matching no mount point go
//! to the root filesystem unchanged.
//!
//! Matching is not segment-aware: the trailing separator of the mount path
//! is what keeps `/fs1/` from matching `/fs10/x`.

use core::fmt;
use std::rc::Rc;

use kaal_drivers::BlockDeviceRef;

use crate::config::MAX_MOUNT_PATH;
use crate::error::{Result, VfsError};
use crate::filesystem::FsHandle;
use crate::types::MountFlags;

/// A mounted filesystem and the path it is mounted at
struct MountPoint {
    path: [u8; MAX_MOUNT_PATH],
    path_len: usize,
    fs: FsHandle,
}

impl MountPoint {
    fn new(path: &str, fs: FsHandle) -> Self {
        let mut buf = [0; MAX_MOUNT_PATH];
        buf[..path.len()].copy_from_slice(path.as_bytes());
        Self {
            path: buf,
            path_len: path.len(),
            fs,
        }
    }

    fn path(&self) -> &str {
        core::str::from_utf8(&self.path[..self.path_len]).unwrap_or("")
    }
}

/// Result of resolving a path to a filesystem
pub struct Resolved<'p> {
    pub fs: FsHandle,
    /// Path relative to the filesystem
    pub path: &'p str,
    /// Secondary path (e.g. `rename` target) relative to the filesystem
    pub secondary: Option<&'p str>,
}

/// The table of mount points
pub struct MountManager {
    mounts: Vec<Option<MountPoint>>,
    root: Option<FsHandle>,
}

impl MountManager {
    /// Create a manager with `capacity` mount points (root excluded)
    pub fn new(capacity: usize) -> Self {
        Self {
            mounts: (0..capacity).map(|_| None).collect(),
            root: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mounts.len()
    }

    /// The root filesystem, if one was set
    pub fn root(&self) -> Option<FsHandle> {
        self.root.clone()
    }

    /// Filesystem mounted in slot `index`
    pub fn file_system(&self, index: usize) -> Option<FsHandle> {
        self.mounts
            .get(index)
            .and_then(|mp| mp.as_ref())
            .map(|mp| mp.fs.clone())
    }

    /// Mount path of slot `index`
    pub fn path(&self, index: usize) -> Option<&str> {
        self.mounts
            .get(index)
            .and_then(|mp| mp.as_ref())
            .map(MountPoint::path)
    }

    /// Number of occupied mount points
    pub fn mounted(&self) -> usize {
        self.mounts.iter().flatten().count()
    }

    /// Install `fs` as the root filesystem
    ///
    /// The block device is attached and the mount hook invoked with `flags`;
    /// the hook's result is returned. A previous root is replaced without
    /// being unmounted.
    pub fn set_root(
        &mut self,
        fs: FsHandle,
        block_device: Option<BlockDeviceRef>,
        flags: MountFlags,
    ) -> Result<()> {
        log::info!("root filesystem set (flags {:#x})", flags.bits());
        self.root = Some(fs.clone());

        let mut fs = fs.borrow_mut();
        fs.set_block_device(block_device);
        fs.do_mount(flags)
    }

    /// Mount `fs` at `path`
    ///
    /// # Arguments
    /// * `fs` - The filesystem to mount
    /// * `path` - Mount path, starting and ending with `/`
    /// * `block_device` - Device attached to the filesystem before mounting
    /// * `flags` - Passed to the mount hook
    ///
    /// # Errors
    /// - [`VfsError::InvalidArgument`] if `path` is malformed or too long
    /// - [`VfsError::Busy`] if `path` is already mounted
    /// - [`VfsError::NoSpace`] if every mount point is taken
    /// - Whatever the mount hook reports; the table is left unchanged
    pub fn mount(
        &mut self,
        fs: FsHandle,
        path: &str,
        block_device: Option<BlockDeviceRef>,
        flags: MountFlags,
    ) -> Result<()> {
        Self::check_path(path)?;

        if self.position(path).is_some() {
            log::debug!("{} is already mounted", path);
            return Err(VfsError::Busy);
        }

        let slot = self
            .mounts
            .iter()
            .position(Option::is_none)
            .ok_or(VfsError::NoSpace)?;

        {
            let mut fs = fs.borrow_mut();
            fs.set_block_device(block_device);
            if let Err(err) = fs.do_mount(flags) {
                fs.set_block_device(None);
                return Err(err);
            }
        }

        log::info!("mounted {} (flags {:#x})", path, flags.bits());
        self.mounts[slot] = Some(MountPoint::new(path, fs));
        Ok(())
    }

    /// Unmount the filesystem mounted exactly at `path`
    ///
    /// The filesystem is synced, its unmount hook invoked with `flags`, and
    /// its block device detached. Hook failures are logged; the mount point
    /// is freed in every case.
    ///
    /// # Errors
    /// [`VfsError::InvalidArgument`] if nothing is mounted at `path`
    pub fn umount(&mut self, path: &str, flags: MountFlags) -> Result<()> {
        let slot = self.position(path).ok_or(VfsError::InvalidArgument)?;
        let mp = self.mounts[slot].take().ok_or(VfsError::InvalidArgument)?;

        let mut fs = mp.fs.borrow_mut();
        if let Err(err) = fs.do_sync() {
            log::warn!("sync of {} failed: {}", path, err);
        }
        if let Err(err) = fs.do_unmount(flags) {
            log::warn!("unmount of {} failed: {}", path, err);
        }
        fs.set_block_device(None);

        log::info!("unmounted {}", path);
        Ok(())
    }

    /// Resolve `path` to its filesystem
    ///
    /// `secondary` is stripped of the same prefix when it lies under the
    /// same mount point; it is returned unchanged otherwise.
    ///
    /// # Returns
    /// `None` if no mount point matches and no root is set
    pub fn identify<'p>(&self, path: &'p str, secondary: Option<&'p str>) -> Option<Resolved<'p>> {
        let mut best: Option<&MountPoint> = None;
        for mp in self.mounts.iter().flatten() {
            if path.starts_with(mp.path()) && best.map_or(true, |b| mp.path_len > b.path_len) {
                best = Some(mp);
            }
        }

        match best {
            Some(mp) => {
                let prefix = mp.path();
                let strip = mp.path_len - 1;
                Some(Resolved {
                    fs: mp.fs.clone(),
                    path: &path[strip..],
                    secondary: secondary
                        .map(|s| if s.starts_with(prefix) { &s[strip..] } else { s }),
                })
            }
            None => self.root.clone().map(|fs| Resolved {
                fs,
                path,
                secondary,
            }),
        }
    }

    /// Sync every mounted filesystem and the root
    pub fn sync_all(&self) {
        let mut synced: Vec<&FsHandle> = Vec::with_capacity(self.mounts.len() + 1);
        let all = self.mounts.iter().flatten().map(|mp| &mp.fs).chain(self.root.as_ref());
        for fs in all {
            if synced.iter().any(|done| Rc::ptr_eq(done, fs)) {
                continue;
            }
            if let Err(err) = fs.borrow_mut().do_sync() {
                log::warn!("sync failed: {}", err);
            }
            synced.push(fs);
        }
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.mounts
            .iter()
            .position(|mp| matches!(mp, Some(mp) if mp.path() == path))
    }

    fn check_path(path: &str) -> Result<()> {
        if path.len() > MAX_MOUNT_PATH || !path.starts_with('/') || !path.ends_with('/') {
            return Err(VfsError::InvalidArgument);
        }
        Ok(())
    }
}

impl fmt::Debug for MountManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MountManager[")?;
        for mp in self.mounts.iter().flatten() {
            writeln!(f, "  {}", mp.path())?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    use kaal_drivers::{same_device, BlockDevice};

    use crate::filesystem::{FileSystem, FsBase};

    struct TestFs {
        base: FsBase,
        flags: u32,
        sync_count: u32,
        fail_mount: bool,
    }

    impl TestFs {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                base: FsBase::default(),
                flags: 1,
                sync_count: 1,
                fail_mount: false,
            }))
        }
    }

    impl FileSystem for TestFs {
        fn fs_base(&self) -> &FsBase {
            &self.base
        }

        fn fs_base_mut(&mut self) -> &mut FsBase {
            &mut self.base
        }

        fn do_mount(&mut self, flags: MountFlags) -> Result<()> {
            if self.fail_mount {
                return Err(VfsError::Other(5));
            }
            self.flags = flags.bits();
            Ok(())
        }

        fn do_unmount(&mut self, flags: MountFlags) -> Result<()> {
            self.flags = flags.bits();
            Ok(())
        }

        fn do_sync(&mut self) -> Result<()> {
            self.sync_count += 1;
            Ok(())
        }
    }

    struct TestDisk;

    impl BlockDevice for TestDisk {}

    fn disk() -> BlockDeviceRef {
        Rc::new(RefCell::new(TestDisk))
    }

    fn flags(bits: u32) -> MountFlags {
        MountFlags::from_bits_retain(bits)
    }

    fn same_fs(a: &FsHandle, b: &Rc<RefCell<TestFs>>) -> bool {
        Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
    }

    #[test]
    fn test_empty_manager() {
        let mm = MountManager::new(2);
        assert_eq!(mm.capacity(), 2);
        for i in 0..2 {
            assert!(mm.file_system(i).is_none());
            assert!(mm.path(i).is_none());
        }
        assert!(mm.root().is_none());
        assert!(mm.identify("/babu/riba", None).is_none());
    }

    #[test]
    fn test_set_root() {
        let mut mm = MountManager::new(2);
        let root_fs = TestFs::new();
        let root_dev = disk();
        assert_eq!(root_fs.borrow().flags, 1);

        mm.set_root(root_fs.clone(), Some(root_dev.clone()), flags(123)).unwrap();
        assert!(same_fs(&mm.root().unwrap(), &root_fs));
        assert!(same_device(&root_fs.borrow().block_device().unwrap(), &root_dev));
        assert_eq!(root_fs.borrow().flags, 123);

        let resolved = mm.identify("/babu/riba", None).unwrap();
        assert!(same_fs(&resolved.fs, &root_fs));
        assert_eq!(resolved.path, "/babu/riba");
    }

    #[test]
    fn test_mount_and_identify() {
        let mut mm = MountManager::new(2);
        let root_fs = TestFs::new();
        let fs1 = TestFs::new();
        let dev1 = disk();
        mm.set_root(root_fs.clone(), None, flags(0)).unwrap();

        mm.mount(fs1.clone(), "/fs1/", Some(dev1.clone()), flags(124)).unwrap();
        assert!(same_fs(&mm.file_system(0).unwrap(), &fs1));
        assert_eq!(mm.path(0), Some("/fs1/"));
        assert!(same_device(&fs1.borrow().block_device().unwrap(), &dev1));
        assert_eq!(fs1.borrow().flags, 124);

        // Not under any mount point
        let resolved = mm.identify("/baburiba", None).unwrap();
        assert!(same_fs(&resolved.fs, &root_fs));
        assert_eq!(resolved.path, "/baburiba");

        let resolved = mm.identify("/fs1/babu", Some("/fs1/riba")).unwrap();
        assert!(same_fs(&resolved.fs, &fs1));
        assert_eq!(resolved.path, "/babu");
        assert_eq!(resolved.secondary, Some("/riba"));

        // Separator-terminated prefix does not match a longer name
        let resolved = mm.identify("/fs10/x", None).unwrap();
        assert!(same_fs(&resolved.fs, &root_fs));
    }

    #[test]
    fn test_mount_errors() {
        let mut mm = MountManager::new(2);
        let fs1 = TestFs::new();
        let fs2 = TestFs::new();

        mm.mount(fs1.clone(), "/fs1/", None, flags(124)).unwrap();
        assert_eq!(mm.mount(fs1.clone(), "/fs1/", None, flags(124)), Err(VfsError::Busy));

        mm.mount(fs2.clone(), "/fs2/", None, flags(124)).unwrap();
        assert_eq!(mm.mount(fs2.clone(), "/fs3/", None, flags(124)), Err(VfsError::NoSpace));

        // Prior entries intact
        assert_eq!(mm.path(0), Some("/fs1/"));
        assert_eq!(mm.path(1), Some("/fs2/"));
        assert_eq!(mm.mounted(), 2);
    }

    #[test]
    fn test_mount_path_validation() {
        let mut mm = MountManager::new(2);
        let fs = TestFs::new();
        assert_eq!(mm.mount(fs.clone(), "/fs1", None, flags(0)), Err(VfsError::InvalidArgument));
        assert_eq!(mm.mount(fs.clone(), "fs1/", None, flags(0)), Err(VfsError::InvalidArgument));

        let long = format!("/{}/", "a".repeat(MAX_MOUNT_PATH));
        assert_eq!(mm.mount(fs, &long, None, flags(0)), Err(VfsError::InvalidArgument));
        assert_eq!(mm.mounted(), 0);
    }

    #[test]
    fn test_failed_mount_hook() {
        let mut mm = MountManager::new(2);
        let fs = TestFs::new();
        fs.borrow_mut().fail_mount = true;

        assert_eq!(
            mm.mount(fs.clone(), "/fs1/", Some(disk()), flags(0)),
            Err(VfsError::Other(5))
        );
        assert_eq!(mm.mounted(), 0);
        assert!(fs.borrow().block_device().is_none());
    }

    #[test]
    fn test_umount() {
        let mut mm = MountManager::new(2);
        let fs1 = TestFs::new();
        mm.mount(fs1.clone(), "/fs1/", Some(disk()), flags(124)).unwrap();

        let count = fs1.borrow().sync_count;
        mm.umount("/fs1/", flags(134)).unwrap();
        assert_eq!(fs1.borrow().flags, 134);
        assert_eq!(fs1.borrow().sync_count, count + 1);
        assert!(fs1.borrow().block_device().is_none());
        assert!(mm.file_system(0).is_none());

        assert_eq!(mm.umount("/fs1/", flags(0)), Err(VfsError::InvalidArgument));

        // Mount again in the freed slot
        mm.mount(fs1.clone(), "/fs1/", None, flags(124)).unwrap();
        assert_eq!(mm.path(0), Some("/fs1/"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut mm = MountManager::new(3);
        let outer = TestFs::new();
        let inner = TestFs::new();
        mm.mount(outer.clone(), "/mnt/", None, flags(0)).unwrap();
        mm.mount(inner.clone(), "/mnt/sd/", None, flags(0)).unwrap();

        let resolved = mm.identify("/mnt/sd/log.txt", None).unwrap();
        assert!(same_fs(&resolved.fs, &inner));
        assert_eq!(resolved.path, "/log.txt");

        let resolved = mm.identify("/mnt/other", None).unwrap();
        assert!(same_fs(&resolved.fs, &outer));
        assert_eq!(resolved.path, "/other");

        assert!(mm.identify("/elsewhere", None).is_none());
    }

    #[test]
    fn test_secondary_under_other_mount() {
        let mut mm = MountManager::new(2);
        mm.mount(TestFs::new(), "/a/", None, flags(0)).unwrap();
        mm.mount(TestFs::new(), "/b/", None, flags(0)).unwrap();

        let resolved = mm.identify("/a/x", Some("/b/y")).unwrap();
        assert_eq!(resolved.path, "/x");
        assert_eq!(resolved.secondary, Some("/b/y"));
    }

    #[test]
    fn test_sync_all() {
        let mut mm = MountManager::new(2);
        let root_fs = TestFs::new();
        let fs1 = TestFs::new();
        mm.set_root(root_fs.clone(), None, flags(0)).unwrap();
        mm.mount(fs1.clone(), "/fs1/", None, flags(0)).unwrap();
        // Same filesystem under a second path is synced once
        mm.mount(fs1.clone(), "/alias/", None, flags(0)).unwrap();

        mm.sync_all();
        assert_eq!(root_fs.borrow().sync_count, 2);
        assert_eq!(fs1.borrow().sync_count, 2);
    }
}
