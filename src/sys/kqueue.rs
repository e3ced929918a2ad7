#![cfg(io_backend = "kqueue")]

//! BSD kqueue driver.
//!
//! kqueue only reports readiness, so the completion model is synthesized: a
//! readiness-driven operation registers one-shot interest for its fd (via
//! mio, with the token carrying the completion's address) and waits on
//! `io_pending`; when the kevent fires, the driver performs the syscall
//! inline and encodes the outcome into `raw_result` exactly like the
//! io_uring driver, so both backends share the decode tables. Operations
//! that are synchronous on the fd (close, openat, fsync) run at enqueue
//! time. Timers sit on `timeouts` as absolute monotonic deadlines and are
//! expired by polling; when a timer is the only reason to enter the kernel,
//! the kevent wait sleeps exactly the remaining time.
//!
//! There are no kernel-side links here. The composite linked submitters
//! enqueue both halves independently and the dispatch thunks cross-cancel
//! through [`Io::cancel_linked`]; `cancel`/`cancel_timeout` are queue
//! removals.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::debug;

use crate::completion::Completion;
use crate::engine::Io;
use crate::error::TimeoutError;
use crate::fifo::Fifo;
use crate::op::Operation;
use crate::time;

/// Ceiling on events harvested per kevent call; anything beyond it stays
/// pending in the kernel and is reaped on the next tick.
const MAX_EVENTS: usize = 256;

impl Io {
    /// Creates an engine backed by a kqueue. `entries` only bounds io_uring
    /// submission rings and is ignored here.
    ///
    /// Installs `SIG_IGN` for `SIGPIPE` process-wide: there is no
    /// `MSG_NOSIGNAL` on these platforms, and a broken-pipe send must reach
    /// the callback as `BrokenPipe`, not kill the process.
    pub fn new(entries: u32) -> io::Result<Io> {
        let _ = entries;
        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        let poll = Poll::new()?;
        debug!(backend = "kqueue", "engine initialized");
        Ok(Io {
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            io_pending: Fifo::new(),
            timeouts: Fifo::new(),
            completed: Fifo::new(),
        })
    }

    /// One non-blocking engine step: poll readiness, perform ready
    /// operations inline, expire timers, run callbacks.
    pub fn tick(&mut self) -> io::Result<()> {
        self.flush(false)
    }

    /// Drives the engine for at least `nanoseconds`, measured on the
    /// monotonic clock, blocking between steps where possible.
    pub fn run_for_ns(&mut self, nanoseconds: u64) -> io::Result<()> {
        let mut timed_out = false;
        let mut completion = Completion::new();
        unsafe {
            self.timeout(
                &mut timed_out as *mut bool,
                mark_timed_out,
                &mut completion,
                nanoseconds,
            );
        }
        while !timed_out {
            self.flush(true)?;
        }
        Ok(())
    }

    fn flush(&mut self, wait_for_completions: bool) -> io::Result<()> {
        let now = time::monotonic_nanos();
        let next_expiry = unsafe { self.timeouts.iter() }
            .map(|completion| unsafe { timer_expires(completion) })
            .min();

        // Block only when the caller asked to wait and there is nothing
        // already deliverable; in that case sleep no longer than the nearest
        // timer deadline.
        let poll_timeout = if wait_for_completions && self.completed.is_empty() {
            match next_expiry {
                Some(expires) => Some(Duration::from_nanos(expires.saturating_sub(now))),
                None if self.io_pending.is_empty() => Some(Duration::ZERO),
                None => None,
            }
        } else {
            Some(Duration::ZERO)
        };

        if let Err(err) = self.poll.poll(&mut self.events, poll_timeout) {
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }

        // Readiness: perform each signalled operation inline. The pending
        // check drops stale events for records that were cancelled after the
        // kernel queued the notification.
        let events = mem::replace(&mut self.events, Events::with_capacity(0));
        for event in events.iter() {
            let completion = event.token().0 as *mut Completion;
            unsafe {
                if self.io_pending.remove(completion) {
                    self.deregister(completion);
                    self.perform(completion);
                }
            }
        }
        self.events = events;

        // Expire timers against a fresh reading; the poll may have slept.
        let now = time::monotonic_nanos();
        let mut timeouts = self.timeouts.take();
        unsafe {
            while let Some(completion) = timeouts.pop() {
                if now >= timer_expires(completion) {
                    (*completion).raw_result = -libc::ETIME;
                    self.completed.push(completion);
                } else {
                    self.timeouts.push(completion);
                }
            }
        }

        // Dispatch from a snapshot so submissions made inside callbacks wait
        // for the next sweep.
        let mut completed = self.completed.take();
        unsafe {
            while let Some(completion) = completed.pop() {
                self.complete(completion);
            }
        }
        Ok(())
    }

    /// Routes a prepared completion: readiness ops arm a kevent, synchronous
    /// ops run now, timers join the deadline list, cancels resolve
    /// immediately.
    pub(crate) fn enqueue(&mut self, completion: *mut Completion) {
        unsafe {
            match &mut (*completion).operation {
                Operation::Accept { .. }
                | Operation::Read { .. }
                | Operation::Recv { .. }
                | Operation::RecvMsg { .. }
                | Operation::Send { .. }
                | Operation::SendMsg { .. }
                | Operation::Write { .. } => self.enqueue_pending(completion),
                Operation::Connect {
                    socket,
                    address,
                    address_size,
                    initiated,
                } => {
                    if !*initiated {
                        *initiated = true;
                        let rc = libc::connect(
                            *socket,
                            (address as *const libc::sockaddr_storage).cast(),
                            *address_size,
                        );
                        if rc == 0 {
                            (*completion).raw_result = 0;
                            self.completed.push(completion);
                            return;
                        }
                        let errno = last_errno();
                        if errno != libc::EINPROGRESS && errno != libc::EAGAIN {
                            (*completion).raw_result = -errno;
                            self.completed.push(completion);
                            return;
                        }
                    }
                    // In progress (or retried): resolve on write readiness.
                    self.enqueue_pending(completion);
                }
                Operation::Close { .. } | Operation::Fsync { .. } | Operation::OpenAt { .. } => {
                    (*completion).raw_result = perform_syscall(&mut (*completion).operation);
                    self.completed.push(completion);
                }
                Operation::Timeout { .. } => self.timeouts.push(completion),
                Operation::Cancel { target } => {
                    let target = *target;
                    self.resolve_cancel(completion, target, false);
                }
                Operation::CancelTimeout { target } => {
                    let target = *target;
                    self.resolve_cancel(completion, target, true);
                }
                Operation::Nop => {
                    (*completion).raw_result = 0;
                    self.completed.push(completion);
                }
            }
        }
    }

    /// No atomic pair support in kqueue: both halves are enqueued
    /// independently and the linked dispatch thunks cross-cancel.
    pub(crate) fn enqueue_linked(&mut self, main: *mut Completion, timeout: *mut Completion) {
        self.enqueue(main);
        self.enqueue(timeout);
    }

    /// Cancels the other half of a linked pair: pulls it off whichever queue
    /// it is waiting on and completes it as canceled. A half that already
    /// completed (or is in the current dispatch snapshot) is left alone; its
    /// own dispatch will fire the composite callback.
    pub(crate) fn cancel_linked(&mut self, target: *mut Completion) {
        unsafe {
            if self.io_pending.remove(target) {
                self.deregister(target);
            } else if !self.timeouts.remove(target) {
                return;
            }
            (*target).raw_result = -libc::ECANCELED;
            self.completed.push(target);
        }
    }

    unsafe fn enqueue_pending(&mut self, completion: *mut Completion) {
        match self.register(completion) {
            Ok(()) => self.io_pending.push(completion),
            Err(err) => {
                (*completion).raw_result = -err.raw_os_error().unwrap_or(libc::EINVAL);
                self.completed.push(completion);
            }
        }
    }

    /// Generic cancellation by completion identity. `timer_only` restricts
    /// the search to the timeout list (`cancel_timeout`).
    unsafe fn resolve_cancel(
        &mut self,
        completion: *mut Completion,
        target: *mut Completion,
        timer_only: bool,
    ) {
        let found = if timer_only {
            self.timeouts.remove(target)
        } else if self.io_pending.remove(target) {
            self.deregister(target);
            true
        } else {
            self.timeouts.remove(target)
        };
        if found {
            (*target).raw_result = -libc::ECANCELED;
            self.completed.push(target);
            (*completion).raw_result = 0;
        } else {
            (*completion).raw_result = -libc::ENOENT;
        }
        self.completed.push(completion);
    }

    /// Performs a readiness-driven operation after its kevent fired. A
    /// `WouldBlock` result means the readiness was spurious; the record is
    /// re-armed instead of surfacing an error.
    unsafe fn perform(&mut self, completion: *mut Completion) {
        let result = perform_syscall(&mut (*completion).operation);
        if result == -libc::EAGAIN {
            self.enqueue_pending(completion);
            return;
        }
        (*completion).raw_result = result;
        self.completed.push(completion);
    }

    unsafe fn register(&mut self, completion: *mut Completion) -> io::Result<()> {
        let (fd, interest) = readiness_target(&(*completion).operation);
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(completion as usize), interest)
    }

    unsafe fn deregister(&mut self, completion: *mut Completion) {
        let (fd, _) = readiness_target(&(*completion).operation);
        let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
    }
}

/// Callback for the internal `run_for_ns` timer.
fn mark_timed_out(
    _io: &mut Io,
    timed_out: *mut bool,
    _completion: *mut Completion,
    _result: Result<(), TimeoutError>,
) {
    unsafe { *timed_out = true };
}

unsafe fn timer_expires(completion: *mut Completion) -> u64 {
    match (*completion).operation {
        Operation::Timeout { expires } => expires,
        _ => unreachable!("non-timer completion on the timeout list"),
    }
}

fn readiness_target(operation: &Operation) -> (RawFd, Interest) {
    match operation {
        Operation::Accept { socket, .. }
        | Operation::Recv { socket, .. }
        | Operation::RecvMsg { socket, .. } => (*socket, Interest::READABLE),
        Operation::Read { fd, .. } => (*fd, Interest::READABLE),
        Operation::Connect { socket, .. }
        | Operation::Send { socket, .. }
        | Operation::SendMsg { socket, .. } => (*socket, Interest::WRITABLE),
        Operation::Write { fd, .. } => (*fd, Interest::WRITABLE),
        _ => unreachable!("operation is not readiness-driven"),
    }
}

/// Runs the operation's syscall and encodes the outcome the way a CQE would:
/// a non-negative value or a negated errno.
unsafe fn perform_syscall(operation: &mut Operation) -> i32 {
    match operation {
        Operation::Accept {
            socket,
            address,
            address_size,
        } => {
            let fd = libc::accept(
                *socket,
                (address as *mut libc::sockaddr_storage).cast(),
                address_size,
            );
            if fd < 0 {
                return -last_errno();
            }
            // Match io_uring's accept, which hands out close-on-exec fds.
            libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            fd
        }
        Operation::Connect { socket, .. } => {
            // Write readiness after initiation: the verdict is in SO_ERROR.
            let mut err: libc::c_int = 0;
            let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
            let rc = libc::getsockopt(
                *socket,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                (&mut err as *mut libc::c_int).cast(),
                &mut len,
            );
            if rc < 0 {
                -last_errno()
            } else {
                -err
            }
        }
        Operation::Close { fd } => zero_or_errno(libc::close(*fd)),
        Operation::Fsync { fd } => zero_or_errno(libc::fsync(*fd)),
        Operation::OpenAt {
            dir_fd,
            path,
            flags,
            mode,
        } => {
            let fd = libc::openat(
                *dir_fd,
                *path,
                *flags | libc::O_CLOEXEC,
                *mode as libc::c_uint,
            );
            if fd < 0 {
                -last_errno()
            } else {
                fd
            }
        }
        Operation::Read {
            fd,
            buffer,
            len,
            offset,
        } => isize_result(libc::pread(
            *fd,
            (*buffer).cast(),
            *len,
            *offset as libc::off_t,
        )),
        Operation::Recv {
            socket,
            buffer,
            len,
        } => isize_result(libc::recv(*socket, (*buffer).cast(), *len, 0)),
        Operation::RecvMsg { socket, msghdr } => {
            isize_result(libc::recvmsg(*socket, *msghdr, 0))
        }
        Operation::Send {
            socket,
            buffer,
            len,
        } => isize_result(libc::send(*socket, (*buffer).cast(), *len, 0)),
        Operation::SendMsg { socket, msghdr } => {
            isize_result(libc::sendmsg(*socket, *msghdr, 0))
        }
        Operation::Write {
            fd,
            buffer,
            len,
            offset,
        } => isize_result(libc::pwrite(
            *fd,
            (*buffer).cast(),
            *len,
            *offset as libc::off_t,
        )),
        Operation::Timeout { .. }
        | Operation::Cancel { .. }
        | Operation::CancelTimeout { .. }
        | Operation::Nop => unreachable!("not a syscall-backed operation"),
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL)
}

fn zero_or_errno(rc: i32) -> i32 {
    if rc < 0 {
        -last_errno()
    } else {
        0
    }
}

fn isize_result(rc: isize) -> i32 {
    if rc < 0 {
        -last_errno()
    } else {
        rc as i32
    }
}
