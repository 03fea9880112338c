//! POSIX Compatibility Layer - Descriptor and path based I/O calls
//!
//! # Purpose
//! Maps the POSIX I/O call surface (open, read, write, ioctl, socket,
//! mount, ...) onto the pool-backed objects of `kaal-vfs`, reporting
//! failures through a last-error indicator with POSIX errno semantics.
//!
//! # Integration Points
//! - Depends on: VFS
//! - Provides to: Applications, C runtime shims
//! - Capabilities required: None
//!
//! # Architecture
//! - [`PosixIo`]: explicitly constructed context holding the descriptor
//!   table, mount manager, device registry and socket pool
//! - Typed entry points (`PosixIo::open`, `PosixIo::read`, ...)
//! - [`Syscall`] / [`PosixIo::handle_syscall`]: raw-integer entry point that
//!   decodes C arguments once and returns C conventions
//!
//! The context is not thread-safe. Callers on a multi-threaded host
//! serialize access themselves.
//!
//! # Testing Strategy
//! - Unit tests: Argument decoding, error tracking
//! - Integration tests: Devices, files, directories, sockets and mounts
//!   driven end to end through recording mocks

pub mod config;
pub mod dispatch;
pub mod syscall;

pub use config::{ConfigError, PosixConfig};
pub use dispatch::PosixIo;
pub use syscall::Syscall;
