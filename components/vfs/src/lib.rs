//! Virtual File System (VFS) - Pool-backed POSIX I/O objects
//!
//! # Purpose
//! Provides the object model behind the POSIX layer: polymorphic devices,
//! files, directories, sockets and filesystems, allocated from fixed-size
//! pools instead of the heap, plus the tables that bind them to descriptors
//! and paths.
//!
//! # Integration Points
//! - Depends on: Block drivers (`kaal-drivers`)
//! - Provides to: POSIX layer, device and filesystem implementations
//! - Capabilities required: None (synchronous, single-threaded)
//!
//! # Architecture
//! - [`ObjectPool`]: fixed-capacity acquire/release store with in-use tracking
//! - [`FileDescriptorTable`]: bounded descriptor → object map, 0..=2 reserved
//! - [`MountManager`]: longest-prefix mount resolution with root fallback
//! - [`DeviceRegistry`]: character devices under `/dev/`
//! - [`Io`], [`CharDevice`], [`File`], [`Directory`], [`Socket`], [`FileSystem`]:
//!   capability traits whose `do_*` hooks default to POSIX behaviour
//!
//! # Testing Strategy
//! - Unit tests: Pool exhaustion and reuse, descriptor allocation order,
//!   prefix resolution, hook defaults
//! - Integration tests: End-to-end dispatch in `kaal-posix`
//! - Performance tests: Pool and descriptor table micro-benchmarks

pub mod config;
pub mod device;
pub mod directory;
pub mod error;
pub mod fd_table;
pub mod file;
pub mod filesystem;
pub mod io;
pub mod mount;
pub mod pool;
pub mod socket;
pub mod types;

pub use device::{CharDevice, CharDeviceRef, DeviceRegistry};
pub use directory::{DirBase, DirEntry, DirHandle, DirRef, Directory, DirectoryPool};
pub use error::{errno, Result, VfsError};
pub use fd_table::FileDescriptorTable;
pub use file::{File, FilePool, FileRef};
pub use filesystem::{FileSystem, FsBase, FsHandle};
pub use io::{AsIo, Io, IoBase, IoKind, IoRef};
pub use mount::{MountManager, Resolved};
pub use pool::{ObjectPool, PoolLink, SlotOwner};
pub use socket::{Socket, SocketPool, SocketRef};
pub use types::{
    Fd, FileStat, IoArg, Mode, MountFlags, MsgFlags, OpenFlags, RecvMessage, SendMessage, UTimes,
    Whence,
};

pub use kaal_drivers::{BlockDevice, BlockDeviceRef};
pub use std::net::{Shutdown, SocketAddr};
