//! Per-operation error types and errno decoding.
//!
//! Every operation has a closed error enum; a callback result is always fully
//! typed and never a bare errno. Both backends feed the same decoders: the
//! io_uring driver hands over the negated-errno CQE result, the kqueue driver
//! encodes its inline syscall results the same way. An errno with no variant
//! maps to `Unexpected`, which keeps the raw value for debugging.
//!
//! `EINTR` never reaches these tables (the engine retries interrupted
//! operations before dispatch) with one exception: `close(2)` leaves the fd
//! closed even when interrupted, so [`close_result`] treats `EINTR` as
//! success rather than risking a double close.

use std::os::unix::io::RawFd;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcceptError {
    #[error("operation would block")]
    Again,
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("connection aborted")]
    ConnectionAborted,
    #[error("socket is not listening")]
    SocketNotListening,
    #[error("process fd quota exceeded")]
    ProcessFdQuotaExceeded,
    #[error("system fd quota exceeded")]
    SystemFdQuotaExceeded,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("file descriptor is not a socket")]
    FileDescriptorNotASocket,
    #[error("operation not supported")]
    OperationNotSupported,
    #[error("permission denied")]
    PermissionDenied,
    #[error("protocol failure")]
    ProtocolFailure,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("access denied")]
    AccessDenied,
    #[error("address in use")]
    AddressInUse,
    #[error("address not available")]
    AddressNotAvailable,
    #[error("address family not supported")]
    AddressFamilyNotSupported,
    #[error("operation would block")]
    Again,
    #[error("connection attempt already in progress")]
    OpenAlreadyInProgress,
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("socket already connected")]
    AlreadyConnected,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("file not found")]
    FileNotFound,
    #[error("file descriptor is not a socket")]
    FileDescriptorNotASocket,
    #[error("permission denied")]
    PermissionDenied,
    #[error("protocol not supported")]
    ProtocolNotSupported,
    #[error("connection timed out")]
    ConnectionTimedOut,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CloseError {
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("disk quota exceeded")]
    DiskQuota,
    #[error("input/output error")]
    InputOutput,
    #[error("no space left on device")]
    NoSpaceLeft,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("not open for reading")]
    NotOpenForReading,
    #[error("buffer or offset not aligned")]
    Alignment,
    #[error("input/output error")]
    InputOutput,
    #[error("is a directory")]
    IsDir,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("file descriptor is unseekable")]
    Unseekable,
    #[error("operation would block")]
    Again,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("not open for writing")]
    NotOpenForWriting,
    #[error("socket not connected")]
    NotConnected,
    #[error("buffer or offset not aligned")]
    Alignment,
    #[error("input/output error")]
    InputOutput,
    #[error("is a directory")]
    IsDir,
    #[error("disk quota exceeded")]
    DiskQuota,
    #[error("file too big")]
    FileTooBig,
    #[error("access denied")]
    AccessDenied,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("no space left on device")]
    NoSpaceLeft,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("file descriptor is unseekable")]
    Unseekable,
    #[error("operation would block")]
    Again,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

/// Shared by `recv` and `recvmsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("operation would block")]
    Again,
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("socket not connected")]
    SocketNotConnected,
    #[error("file descriptor is not a socket")]
    FileDescriptorNotASocket,
    #[error("connection reset by peer")]
    ConnectionResetByPeer,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

/// Shared by `send` and `sendmsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("access denied")]
    AccessDenied,
    #[error("operation would block")]
    Again,
    #[error("fast open already in progress")]
    FastOpenAlreadyInProgress,
    #[error("address family not supported")]
    AddressFamilyNotSupported,
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("connection reset by peer")]
    ConnectionResetByPeer,
    #[error("message too big")]
    MessageTooBig,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("socket not connected")]
    SocketNotConnected,
    #[error("file descriptor is not a socket")]
    FileDescriptorNotASocket,
    #[error("operation not supported")]
    OperationNotSupported,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsyncError {
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("disk quota exceeded")]
    DiskQuota,
    #[error("arguments invalid")]
    ArgumentsInvalid,
    #[error("input/output error")]
    InputOutput,
    #[error("no space left on device")]
    NoSpaceLeft,
    #[error("read-only file system")]
    ReadOnlyFileSystem,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenatError {
    #[error("access denied")]
    AccessDenied,
    #[error("file descriptor invalid")]
    FileDescriptorInvalid,
    #[error("device busy")]
    DeviceBusy,
    #[error("path already exists")]
    PathAlreadyExists,
    #[error("file too big")]
    FileTooBig,
    #[error("arguments invalid")]
    ArgumentsInvalid,
    #[error("is a directory")]
    IsDir,
    #[error("symlink loop")]
    SymLinkLoop,
    #[error("process fd quota exceeded")]
    ProcessFdQuotaExceeded,
    #[error("name too long")]
    NameTooLong,
    #[error("system fd quota exceeded")]
    SystemFdQuotaExceeded,
    #[error("no such device")]
    NoDevice,
    #[error("file not found")]
    FileNotFound,
    #[error("system resources exhausted")]
    SystemResources,
    #[error("no space left on device")]
    NoSpaceLeft,
    #[error("not a directory")]
    NotDir,
    #[error("file locks not supported")]
    FileLocksNotSupported,
    #[error("operation would block")]
    Again,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

/// Shared by `timeout` and the linked timeout half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeoutError {
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("target already in progress")]
    AlreadyInProgress,
    #[error("target not found")]
    NotFound,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelTimeoutError {
    #[error("target already in progress")]
    AlreadyInProgress,
    #[error("target not found")]
    NotFound,
    #[error("operation canceled")]
    Canceled,
    #[error("unexpected errno {0}")]
    Unexpected(i32),
}

pub(crate) fn accept_result(raw: i32) -> Result<RawFd, AcceptError> {
    if raw >= 0 {
        return Ok(raw);
    }
    Err(match -raw {
        libc::EAGAIN => AcceptError::Again,
        libc::EBADF => AcceptError::FileDescriptorInvalid,
        libc::ECONNABORTED => AcceptError::ConnectionAborted,
        libc::EINVAL => AcceptError::SocketNotListening,
        libc::EMFILE => AcceptError::ProcessFdQuotaExceeded,
        libc::ENFILE => AcceptError::SystemFdQuotaExceeded,
        libc::ENOBUFS | libc::ENOMEM => AcceptError::SystemResources,
        libc::ENOTSOCK => AcceptError::FileDescriptorNotASocket,
        libc::EOPNOTSUPP => AcceptError::OperationNotSupported,
        libc::EPERM => AcceptError::PermissionDenied,
        libc::EPROTO => AcceptError::ProtocolFailure,
        libc::ECANCELED => AcceptError::Canceled,
        errno => AcceptError::Unexpected(errno),
    })
}

pub(crate) fn connect_result(raw: i32) -> Result<(), ConnectError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        libc::EACCES => ConnectError::AccessDenied,
        libc::EADDRINUSE => ConnectError::AddressInUse,
        libc::EADDRNOTAVAIL => ConnectError::AddressNotAvailable,
        libc::EAFNOSUPPORT => ConnectError::AddressFamilyNotSupported,
        libc::EAGAIN | libc::EINPROGRESS => ConnectError::Again,
        libc::EALREADY => ConnectError::OpenAlreadyInProgress,
        libc::EBADF => ConnectError::FileDescriptorInvalid,
        libc::ECONNREFUSED => ConnectError::ConnectionRefused,
        libc::EISCONN => ConnectError::AlreadyConnected,
        libc::ENETUNREACH => ConnectError::NetworkUnreachable,
        libc::ENOENT => ConnectError::FileNotFound,
        libc::ENOTSOCK => ConnectError::FileDescriptorNotASocket,
        libc::EPERM => ConnectError::PermissionDenied,
        libc::EPROTOTYPE => ConnectError::ProtocolNotSupported,
        libc::ETIMEDOUT => ConnectError::ConnectionTimedOut,
        libc::ECANCELED => ConnectError::Canceled,
        errno => ConnectError::Unexpected(errno),
    })
}

pub(crate) fn close_result(raw: i32) -> Result<(), CloseError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        // The fd is closed regardless of the interruption.
        libc::EINTR => return Ok(()),
        libc::EBADF => CloseError::FileDescriptorInvalid,
        libc::EDQUOT => CloseError::DiskQuota,
        libc::EIO => CloseError::InputOutput,
        libc::ENOSPC => CloseError::NoSpaceLeft,
        libc::ECANCELED => CloseError::Canceled,
        errno => CloseError::Unexpected(errno),
    })
}

pub(crate) fn read_result(raw: i32) -> Result<usize, ReadError> {
    if raw >= 0 {
        return Ok(raw as usize);
    }
    Err(match -raw {
        libc::EBADF => ReadError::NotOpenForReading,
        libc::EINVAL => ReadError::Alignment,
        libc::EIO => ReadError::InputOutput,
        libc::EISDIR => ReadError::IsDir,
        libc::ENOBUFS | libc::ENOMEM => ReadError::SystemResources,
        libc::ENXIO | libc::ESPIPE | libc::EOVERFLOW => ReadError::Unseekable,
        libc::EAGAIN => ReadError::Again,
        libc::ECANCELED => ReadError::Canceled,
        errno => ReadError::Unexpected(errno),
    })
}

pub(crate) fn write_result(raw: i32) -> Result<usize, WriteError> {
    if raw >= 0 {
        return Ok(raw as usize);
    }
    Err(match -raw {
        libc::EBADF => WriteError::NotOpenForWriting,
        libc::EDESTADDRREQ => WriteError::NotConnected,
        libc::EINVAL => WriteError::Alignment,
        libc::EIO => WriteError::InputOutput,
        libc::EISDIR => WriteError::IsDir,
        libc::EDQUOT => WriteError::DiskQuota,
        libc::EFBIG => WriteError::FileTooBig,
        libc::EACCES | libc::EPERM => WriteError::AccessDenied,
        libc::EPIPE => WriteError::BrokenPipe,
        libc::ENOSPC => WriteError::NoSpaceLeft,
        libc::ENOBUFS | libc::ENOMEM => WriteError::SystemResources,
        libc::ENXIO | libc::ESPIPE | libc::EOVERFLOW => WriteError::Unseekable,
        libc::EAGAIN => WriteError::Again,
        libc::ECANCELED => WriteError::Canceled,
        errno => WriteError::Unexpected(errno),
    })
}

pub(crate) fn recv_result(raw: i32) -> Result<usize, RecvError> {
    if raw >= 0 {
        return Ok(raw as usize);
    }
    Err(match -raw {
        libc::EAGAIN => RecvError::Again,
        libc::EBADF => RecvError::FileDescriptorInvalid,
        libc::ECONNREFUSED => RecvError::ConnectionRefused,
        libc::ENOBUFS | libc::ENOMEM => RecvError::SystemResources,
        libc::ENOTCONN => RecvError::SocketNotConnected,
        libc::ENOTSOCK => RecvError::FileDescriptorNotASocket,
        libc::ECONNRESET => RecvError::ConnectionResetByPeer,
        libc::ECANCELED => RecvError::Canceled,
        errno => RecvError::Unexpected(errno),
    })
}

pub(crate) fn send_result(raw: i32) -> Result<usize, SendError> {
    if raw >= 0 {
        return Ok(raw as usize);
    }
    Err(match -raw {
        libc::EACCES => SendError::AccessDenied,
        libc::EAGAIN => SendError::Again,
        libc::EALREADY => SendError::FastOpenAlreadyInProgress,
        libc::EAFNOSUPPORT => SendError::AddressFamilyNotSupported,
        libc::EBADF => SendError::FileDescriptorInvalid,
        libc::ECONNRESET => SendError::ConnectionResetByPeer,
        libc::EMSGSIZE => SendError::MessageTooBig,
        libc::ENOBUFS | libc::ENOMEM => SendError::SystemResources,
        libc::ENOTCONN => SendError::SocketNotConnected,
        libc::ENOTSOCK => SendError::FileDescriptorNotASocket,
        libc::EOPNOTSUPP => SendError::OperationNotSupported,
        libc::EPIPE => SendError::BrokenPipe,
        libc::ECANCELED => SendError::Canceled,
        errno => SendError::Unexpected(errno),
    })
}

pub(crate) fn fsync_result(raw: i32) -> Result<(), FsyncError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        libc::EBADF => FsyncError::FileDescriptorInvalid,
        libc::EDQUOT => FsyncError::DiskQuota,
        libc::EINVAL => FsyncError::ArgumentsInvalid,
        libc::EIO => FsyncError::InputOutput,
        libc::ENOSPC => FsyncError::NoSpaceLeft,
        libc::EROFS => FsyncError::ReadOnlyFileSystem,
        libc::ECANCELED => FsyncError::Canceled,
        errno => FsyncError::Unexpected(errno),
    })
}

pub(crate) fn openat_result(raw: i32) -> Result<RawFd, OpenatError> {
    if raw >= 0 {
        return Ok(raw);
    }
    Err(match -raw {
        libc::EACCES => OpenatError::AccessDenied,
        libc::EBADF => OpenatError::FileDescriptorInvalid,
        libc::EBUSY => OpenatError::DeviceBusy,
        libc::EEXIST => OpenatError::PathAlreadyExists,
        libc::EFBIG | libc::EOVERFLOW => OpenatError::FileTooBig,
        libc::EINVAL => OpenatError::ArgumentsInvalid,
        libc::EISDIR => OpenatError::IsDir,
        libc::ELOOP => OpenatError::SymLinkLoop,
        libc::EMFILE => OpenatError::ProcessFdQuotaExceeded,
        libc::ENAMETOOLONG => OpenatError::NameTooLong,
        libc::ENFILE => OpenatError::SystemFdQuotaExceeded,
        libc::ENODEV | libc::ENXIO => OpenatError::NoDevice,
        libc::ENOENT => OpenatError::FileNotFound,
        libc::ENOMEM => OpenatError::SystemResources,
        libc::ENOSPC => OpenatError::NoSpaceLeft,
        libc::ENOTDIR => OpenatError::NotDir,
        libc::EOPNOTSUPP => OpenatError::FileLocksNotSupported,
        libc::EAGAIN => OpenatError::Again,
        libc::ECANCELED => OpenatError::Canceled,
        errno => OpenatError::Unexpected(errno),
    })
}

/// `ETIME` is the expected way a timer reports firing; anything non-negative
/// also counts as success so both backends can encode expiry uniformly.
pub(crate) fn timeout_result(raw: i32) -> Result<(), TimeoutError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        libc::ETIME => return Ok(()),
        libc::ECANCELED => TimeoutError::Canceled,
        errno => TimeoutError::Unexpected(errno),
    })
}

pub(crate) fn cancel_result(raw: i32) -> Result<(), CancelError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        libc::ENOENT => CancelError::NotFound,
        libc::EALREADY => CancelError::AlreadyInProgress,
        errno => CancelError::Unexpected(errno),
    })
}

pub(crate) fn cancel_timeout_result(raw: i32) -> Result<(), CancelTimeoutError> {
    if raw >= 0 {
        return Ok(());
    }
    Err(match -raw {
        libc::ENOENT => CancelTimeoutError::NotFound,
        libc::EALREADY | libc::EBUSY => CancelTimeoutError::AlreadyInProgress,
        libc::ECANCELED => CancelTimeoutError::Canceled,
        errno => CancelTimeoutError::Unexpected(errno),
    })
}
