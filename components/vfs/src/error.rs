//! VFS error types
//!
//! Every variant corresponds to exactly one POSIX errno value so the dispatch
//! layer can publish it through its last-error indicator.

use kaal_drivers::DriverError;
use thiserror::Error;

/// POSIX errno values used by this layer
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOTTY: i32 = 25;
    pub const ENOSPC: i32 = 28;
    pub const ENOSYS: i32 = 38;
    pub const ENOTSOCK: i32 = 88;
}

/// VFS error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("Bad address")]
    Fault,

    #[error("No such file or directory")]
    NoSuchEntity,

    #[error("Bad file descriptor")]
    BadFileDescriptor,

    #[error("Device or resource busy")]
    Busy,

    #[error("Too many open files in system")]
    TooManyOpenFiles,

    #[error("Too many open files")]
    ProcessLimit,

    #[error("Function not implemented")]
    NotSupported,

    #[error("Not a terminal")]
    NotATerminal,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("No space left on device")]
    NoSpace,

    #[error("Not a socket")]
    NotASocket,

    #[error("I/O error (errno {0})")]
    Other(i32),
}

impl VfsError {
    /// The POSIX errno value for this error
    pub const fn errno(self) -> i32 {
        match self {
            VfsError::Fault => errno::EFAULT,
            VfsError::NoSuchEntity => errno::ENOENT,
            VfsError::BadFileDescriptor => errno::EBADF,
            VfsError::Busy => errno::EBUSY,
            VfsError::TooManyOpenFiles => errno::ENFILE,
            VfsError::ProcessLimit => errno::EMFILE,
            VfsError::NotSupported => errno::ENOSYS,
            VfsError::NotATerminal => errno::ENOTTY,
            VfsError::InvalidArgument => errno::EINVAL,
            VfsError::NoSpace => errno::ENOSPC,
            VfsError::NotASocket => errno::ENOTSOCK,
            VfsError::Other(code) => code,
        }
    }
}

impl From<DriverError> for VfsError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotSupported => VfsError::NotSupported,
            DriverError::OutOfRange { .. } | DriverError::Misaligned { .. } => {
                VfsError::InvalidArgument
            }
            DriverError::HardwareError(_) => VfsError::Other(errno::EIO),
        }
    }
}

pub type Result<T> = core::result::Result<T, VfsError>;
