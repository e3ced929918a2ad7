//! Operation descriptors.
//!
//! An [`Operation`] is a tagged variant describing one submission and the
//! parameters its kernel entry needs. Payloads that the kernel writes into
//! (the accept peer address) or reads at submission time (timespecs, socket
//! addresses) live inside the variant, because the enclosing completion
//! record is the only per-operation storage the engine has.

use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

#[cfg(io_backend = "io_uring")]
use io_uring::types;

use crate::completion::Completion;

#[cfg(io_backend = "io_uring")]
const NANOS_PER_SEC: u64 = 1_000_000_000;

pub(crate) enum Operation {
    /// Default state of a freshly created completion; never submitted.
    Nop,
    Accept {
        socket: RawFd,
        /// Peer address slot filled by the kernel. Not yet surfaced to the
        /// caller, but kept so a future accessor does not change the record
        /// layout.
        address: libc::sockaddr_storage,
        address_size: libc::socklen_t,
    },
    Cancel {
        target: *mut Completion,
    },
    CancelTimeout {
        target: *mut Completion,
    },
    Close {
        fd: RawFd,
    },
    Connect {
        socket: RawFd,
        address: libc::sockaddr_storage,
        address_size: libc::socklen_t,
        /// Set once `connect(2)` has been issued, so the kqueue
        /// write-readiness path resolves the result via `SO_ERROR` instead of
        /// re-entering `connect`.
        #[cfg(io_backend = "kqueue")]
        initiated: bool,
    },
    Fsync {
        fd: RawFd,
    },
    #[cfg(io_backend = "io_uring")]
    LinkTimeout {
        timespec: types::Timespec,
    },
    OpenAt {
        dir_fd: RawFd,
        path: *const libc::c_char,
        flags: i32,
        mode: libc::mode_t,
    },
    Read {
        fd: RawFd,
        buffer: *mut u8,
        len: usize,
        offset: u64,
    },
    Recv {
        socket: RawFd,
        buffer: *mut u8,
        len: usize,
    },
    RecvMsg {
        socket: RawFd,
        msghdr: *mut libc::msghdr,
    },
    Send {
        socket: RawFd,
        buffer: *const u8,
        len: usize,
    },
    SendMsg {
        socket: RawFd,
        msghdr: *const libc::msghdr,
    },
    Timeout {
        #[cfg(io_backend = "io_uring")]
        timespec: types::Timespec,
        /// Absolute monotonic expiry, kqueue only: the timer list is polled
        /// against `time::monotonic_nanos()`.
        #[cfg(io_backend = "kqueue")]
        expires: u64,
    },
    Write {
        fd: RawFd,
        buffer: *const u8,
        len: usize,
        offset: u64,
    },
}

impl Operation {
    pub(crate) fn accept(socket: RawFd) -> Operation {
        Operation::Accept {
            socket,
            address: unsafe { mem::zeroed() },
            address_size: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    pub(crate) fn connect(socket: RawFd, address: &SocketAddr) -> Operation {
        let (address, address_size) = sockaddr_from(address);
        Operation::Connect {
            socket,
            address,
            address_size,
            #[cfg(io_backend = "kqueue")]
            initiated: false,
        }
    }

    /// A relative timeout of `nanoseconds`, measured from kernel acceptance
    /// (io_uring) or from enqueue time (kqueue).
    pub(crate) fn timeout(nanoseconds: u64) -> Operation {
        Operation::Timeout {
            #[cfg(io_backend = "io_uring")]
            timespec: timespec_from_nanos(nanoseconds),
            #[cfg(io_backend = "kqueue")]
            expires: crate::time::monotonic_nanos() + nanoseconds,
        }
    }

    /// The timeout half of a linked pair. io_uring attaches it to the
    /// preceding submission with a kernel link timeout; kqueue has no link
    /// support, so the half is a plain timer and the linked dispatchers
    /// cross-cancel.
    pub(crate) fn link_timeout(nanoseconds: u64) -> Operation {
        #[cfg(io_backend = "io_uring")]
        {
            Operation::LinkTimeout {
                timespec: timespec_from_nanos(nanoseconds),
            }
        }
        #[cfg(io_backend = "kqueue")]
        {
            Operation::timeout(nanoseconds)
        }
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Operation::Nop => "nop",
            Operation::Accept { .. } => "accept",
            Operation::Cancel { .. } => "cancel",
            Operation::CancelTimeout { .. } => "cancel_timeout",
            Operation::Close { .. } => "close",
            Operation::Connect { .. } => "connect",
            Operation::Fsync { .. } => "fsync",
            #[cfg(io_backend = "io_uring")]
            Operation::LinkTimeout { .. } => "link_timeout",
            Operation::OpenAt { .. } => "openat",
            Operation::Read { .. } => "read",
            Operation::Recv { .. } => "recv",
            Operation::RecvMsg { .. } => "recvmsg",
            Operation::Send { .. } => "send",
            Operation::SendMsg { .. } => "sendmsg",
            Operation::Timeout { .. } => "timeout",
            Operation::Write { .. } => "write",
        }
    }
}

#[cfg(io_backend = "io_uring")]
fn timespec_from_nanos(nanoseconds: u64) -> types::Timespec {
    types::Timespec::new()
        .sec(nanoseconds / NANOS_PER_SEC)
        .nsec((nanoseconds % NANOS_PER_SEC) as u32)
}

/// Clamps a buffer length to the per-platform maximum the kernel accepts for
/// a single transfer; larger values return `EINVAL`.
pub fn buffer_limit(len: usize) -> usize {
    #[cfg(target_os = "linux")]
    const MAX_TRANSFER: usize = 0x7fff_f000;
    #[cfg(target_os = "macos")]
    const MAX_TRANSFER: usize = 0x7fff_ffff;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_TRANSFER: usize = isize::MAX as usize;

    len.min(MAX_TRANSFER)
}

/// Encodes a socket address into the storage form the kernel takes.
pub(crate) fn sockaddr_from(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let size = match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in>() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            #[cfg(any(
                target_os = "macos",
                target_os = "freebsd",
                target_os = "netbsd"
            ))]
            {
                sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
            }
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in6>() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            #[cfg(any(
                target_os = "macos",
                target_os = "freebsd",
                target_os = "netbsd"
            ))]
            {
                sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
            }
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, size as libc::socklen_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_limit_clamps_only_past_the_platform_maximum() {
        assert_eq!(buffer_limit(0), 0);
        assert_eq!(buffer_limit(4096), 4096);
        assert!(buffer_limit(usize::MAX) < usize::MAX);
        #[cfg(target_os = "linux")]
        assert_eq!(buffer_limit(usize::MAX), 0x7fff_f000);
    }

    #[test]
    fn sockaddr_from_encodes_ipv4() {
        let addr: SocketAddr = "127.0.0.1:3131".parse().unwrap();
        let (storage, size) = sockaddr_from(&addr);
        assert_eq!(size as usize, mem::size_of::<libc::sockaddr_in>());
        let sin = unsafe { &*(&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>() };
        assert_eq!(sin.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(u16::from_be(sin.sin_port), 3131);
        assert_eq!(sin.sin_addr.s_addr.to_ne_bytes(), [127, 0, 0, 1]);
    }

    #[test]
    fn sockaddr_from_encodes_ipv6() {
        let addr: SocketAddr = "[::1]:9000".parse().unwrap();
        let (storage, size) = sockaddr_from(&addr);
        assert_eq!(size as usize, mem::size_of::<libc::sockaddr_in6>());
        let sin6 = unsafe { &*(&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in6>() };
        assert_eq!(sin6.sin6_family, libc::AF_INET6 as libc::sa_family_t);
        assert_eq!(u16::from_be(sin6.sin6_port), 9000);
    }

    #[test]
    fn tags_name_the_operation() {
        assert_eq!(Operation::Nop.tag(), "nop");
        assert_eq!(Operation::accept(3).tag(), "accept");
        assert_eq!(Operation::timeout(0).tag(), "timeout");
        assert_eq!(Operation::Close { fd: 3 }.tag(), "close");
    }
}
