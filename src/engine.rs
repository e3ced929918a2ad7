//! Engine facade: submitters, dispatch, and the linked-pair protocol.
//!
//! [`Io`] is driven by exactly one thread. Submitters fill a caller-owned
//! [`Completion`] and enqueue it on the backend; [`Io::tick`] flushes
//! submissions, harvests kernel completions, and invokes each completion's
//! callback. Callbacks receive the engine by `&mut` reference and are the
//! one place follow-up operations may be submitted; submissions made there
//! are processed on the next sweep, never during the current one.
//!
//! The backend halves of `Io` (queue flushing, SQE/kevent translation,
//! `new`/`tick`/`run_for_ns`) live in [`crate::sys`].

use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use tracing::trace;

use crate::completion::{Completion, LinkedCompletion, LinkedResult, Thunk};
use crate::error::{
    self, AcceptError, CancelError, CancelTimeoutError, CloseError, ConnectError, FsyncError,
    OpenatError, ReadError, RecvError, SendError, TimeoutError, WriteError,
};
use crate::fifo::Fifo;
use crate::op::{buffer_limit, Operation};

/// A single-threaded, completion-based I/O engine.
///
/// One instance owns one kernel queue (io_uring ring or kqueue) and all the
/// intrusive lists that feed it. Dropping the engine closes the kernel queue;
/// callbacks of still-outstanding submissions will never fire, so drive the
/// engine to quiescence first.
pub struct Io {
    #[cfg(io_backend = "io_uring")]
    pub(crate) ring: io_uring::IoUring,
    /// Submissions that did not fit in the submission queue, retried after
    /// completions drain. Linked pairs sit here adjacently, main first.
    #[cfg(io_backend = "io_uring")]
    pub(crate) unqueued: Fifo,

    #[cfg(io_backend = "kqueue")]
    pub(crate) poll: mio::Poll,
    #[cfg(io_backend = "kqueue")]
    pub(crate) events: mio::Events,
    /// Readiness-driven submissions awaiting their one-shot kevent.
    #[cfg(io_backend = "kqueue")]
    pub(crate) io_pending: Fifo,
    /// Active timers, expired by polling against the monotonic clock.
    #[cfg(io_backend = "kqueue")]
    pub(crate) timeouts: Fifo,

    /// Harvested completions awaiting callback dispatch.
    pub(crate) completed: Fifo,
}

// Typed callback signatures, one per operation family. The context pointer is
// the caller's and is passed back untouched.
pub type AcceptCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<RawFd, AcceptError>);
pub type CloseCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<(), CloseError>);
pub type ConnectCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<(), ConnectError>);
pub type FsyncCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<(), FsyncError>);
pub type OpenatCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<RawFd, OpenatError>);
pub type ReadCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<usize, ReadError>);
pub type RecvCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<usize, RecvError>);
pub type SendCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<usize, SendError>);
pub type WriteCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<usize, WriteError>);
pub type TimeoutCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<(), TimeoutError>);
pub type CancelCallback<C> = fn(&mut Io, *mut C, *mut Completion, Result<(), CancelError>);
pub type CancelTimeoutCallback<C> =
    fn(&mut Io, *mut C, *mut Completion, Result<(), CancelTimeoutError>);

// Composite callbacks for the linked submitters; invoked once, with the main
// operation's result, after both halves have reported.
pub type LinkedConnectCallback<C> =
    fn(&mut Io, *mut C, *mut LinkedCompletion, Result<(), ConnectError>);
pub type LinkedRecvCallback<C> =
    fn(&mut Io, *mut C, *mut LinkedCompletion, Result<usize, RecvError>);
pub type LinkedSendCallback<C> =
    fn(&mut Io, *mut C, *mut LinkedCompletion, Result<usize, SendError>);

impl Io {
    /// Submits an `accept` on a listening socket. The accepted fd is
    /// delivered to the callback with `SOCK_CLOEXEC` semantics.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and must not be touched by
    /// the caller until the callback fires.
    pub unsafe fn accept<C>(
        &mut self,
        context: *mut C,
        callback: AcceptCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            accept_thunk::<C>,
            completion,
            Operation::accept(socket),
        );
    }

    /// Submits a `close` of any file descriptor.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires.
    pub unsafe fn close<C>(
        &mut self,
        context: *mut C,
        callback: CloseCallback<C>,
        completion: &mut Completion,
        fd: RawFd,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            close_thunk::<C>,
            completion,
            Operation::Close { fd },
        );
    }

    /// Submits a `connect` on a non-blocking socket.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires.
    pub unsafe fn connect<C>(
        &mut self,
        context: *mut C,
        callback: ConnectCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
        address: SocketAddr,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            connect_thunk::<C>,
            completion,
            Operation::connect(socket, &address),
        );
    }

    /// Submits an `fsync`.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires.
    pub unsafe fn fsync<C>(
        &mut self,
        context: *mut C,
        callback: FsyncCallback<C>,
        completion: &mut Completion,
        fd: RawFd,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            fsync_thunk::<C>,
            completion,
            Operation::Fsync { fd },
        );
    }

    /// Submits an `openat` relative to `dir_fd` (pass `libc::AT_FDCWD` for
    /// the working directory).
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `path` must stay live
    /// and unchanged until the callback fires.
    pub unsafe fn openat<C>(
        &mut self,
        context: *mut C,
        callback: OpenatCallback<C>,
        completion: &mut Completion,
        dir_fd: RawFd,
        path: &std::ffi::CStr,
        flags: i32,
        mode: libc::mode_t,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            openat_thunk::<C>,
            completion,
            Operation::OpenAt {
                dir_fd,
                path: path.as_ptr(),
                flags,
                mode,
            },
        );
    }

    /// Submits a positioned `read`. The buffer length is clamped by
    /// [`buffer_limit`].
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the callback fires.
    pub unsafe fn read<C>(
        &mut self,
        context: *mut C,
        callback: ReadCallback<C>,
        completion: &mut Completion,
        fd: RawFd,
        buffer: &mut [u8],
        offset: u64,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            read_thunk::<C>,
            completion,
            Operation::Read {
                fd,
                buffer: buffer.as_mut_ptr(),
                len: buffer_limit(buffer.len()),
                offset,
            },
        );
    }

    /// Submits a `recv`. The buffer length is clamped by [`buffer_limit`].
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the callback fires.
    pub unsafe fn recv<C>(
        &mut self,
        context: *mut C,
        callback: RecvCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
        buffer: &mut [u8],
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            recv_thunk::<C>,
            completion,
            Operation::Recv {
                socket,
                buffer: buffer.as_mut_ptr(),
                len: buffer_limit(buffer.len()),
            },
        );
    }

    /// Submits a `recvmsg` with a caller-built message header.
    ///
    /// # Safety
    ///
    /// `completion`, `msghdr`, and every buffer the header references must
    /// stay live until the callback fires.
    pub unsafe fn recvmsg<C>(
        &mut self,
        context: *mut C,
        callback: RecvCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
        msghdr: *mut libc::msghdr,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            recv_thunk::<C>,
            completion,
            Operation::RecvMsg { socket, msghdr },
        );
    }

    /// Submits a `send`. The buffer length is clamped by [`buffer_limit`].
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the callback fires.
    pub unsafe fn send<C>(
        &mut self,
        context: *mut C,
        callback: SendCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
        buffer: &[u8],
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            send_thunk::<C>,
            completion,
            Operation::Send {
                socket,
                buffer: buffer.as_ptr(),
                len: buffer_limit(buffer.len()),
            },
        );
    }

    /// Submits a `sendmsg` with a caller-built message header.
    ///
    /// # Safety
    ///
    /// `completion`, `msghdr`, and every buffer the header references must
    /// stay live until the callback fires.
    pub unsafe fn sendmsg<C>(
        &mut self,
        context: *mut C,
        callback: SendCallback<C>,
        completion: &mut Completion,
        socket: RawFd,
        msghdr: *const libc::msghdr,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            send_thunk::<C>,
            completion,
            Operation::SendMsg { socket, msghdr },
        );
    }

    /// Submits a positioned `write`. The buffer length is clamped by
    /// [`buffer_limit`].
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the callback fires.
    pub unsafe fn write<C>(
        &mut self,
        context: *mut C,
        callback: WriteCallback<C>,
        completion: &mut Completion,
        fd: RawFd,
        buffer: &[u8],
        offset: u64,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            write_thunk::<C>,
            completion,
            Operation::Write {
                fd,
                buffer: buffer.as_ptr(),
                len: buffer_limit(buffer.len()),
                offset,
            },
        );
    }

    /// Submits a relative timeout of `nanoseconds`.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires.
    pub unsafe fn timeout<C>(
        &mut self,
        context: *mut C,
        callback: TimeoutCallback<C>,
        completion: &mut Completion,
        nanoseconds: u64,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            timeout_thunk::<C>,
            completion,
            Operation::timeout(nanoseconds),
        );
    }

    /// Submits a cancellation of the in-flight operation using `target` as
    /// its completion. A successfully cancelled target still fires its own
    /// callback, with `Canceled`.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires,
    /// and `target` must point to a completion record that is still live.
    pub unsafe fn cancel<C>(
        &mut self,
        context: *mut C,
        callback: CancelCallback<C>,
        completion: &mut Completion,
        target: *mut Completion,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            cancel_thunk::<C>,
            completion,
            Operation::Cancel { target },
        );
    }

    /// Like [`Io::cancel`], but for a previously submitted timeout; also
    /// surfaces `Canceled` when the target had already been removed.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the callback fires,
    /// and `target` must point to a completion record that is still live.
    pub unsafe fn cancel_timeout<C>(
        &mut self,
        context: *mut C,
        callback: CancelTimeoutCallback<C>,
        completion: &mut Completion,
        target: *mut Completion,
    ) {
        self.submit(
            context.cast(),
            callback as *const (),
            cancel_timeout_thunk::<C>,
            completion,
            Operation::CancelTimeout { target },
        );
    }

    /// `connect` with a follow-up timeout submitted as one atomic pair.
    /// Exactly one half reports `Canceled`: the timeout when the connect won
    /// the race, the connect when the timeout fired first.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address until the composite
    /// callback fires.
    pub unsafe fn connect_with_timeout<C>(
        &mut self,
        context: *mut C,
        callback: LinkedConnectCallback<C>,
        completion: &mut LinkedCompletion,
        socket: RawFd,
        address: SocketAddr,
        timeout_ns: u64,
    ) {
        self.submit_linked(
            context.cast(),
            callback as *const (),
            linked_main_connect_thunk::<C>,
            linked_timeout_connect_thunk::<C>,
            completion,
            Operation::connect(socket, &address),
            timeout_ns,
        );
    }

    /// `recv` with a follow-up timeout; see [`Io::connect_with_timeout`] for
    /// the race semantics.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the composite callback fires.
    pub unsafe fn recv_with_timeout<C>(
        &mut self,
        context: *mut C,
        callback: LinkedRecvCallback<C>,
        completion: &mut LinkedCompletion,
        socket: RawFd,
        buffer: &mut [u8],
        timeout_ns: u64,
    ) {
        self.submit_linked(
            context.cast(),
            callback as *const (),
            linked_main_recv_thunk::<C>,
            linked_timeout_recv_thunk::<C>,
            completion,
            Operation::Recv {
                socket,
                buffer: buffer.as_mut_ptr(),
                len: buffer_limit(buffer.len()),
            },
            timeout_ns,
        );
    }

    /// `recvmsg` with a follow-up timeout.
    ///
    /// # Safety
    ///
    /// `completion`, `msghdr`, and the buffers it references must stay live
    /// until the composite callback fires.
    pub unsafe fn recvmsg_with_timeout<C>(
        &mut self,
        context: *mut C,
        callback: LinkedRecvCallback<C>,
        completion: &mut LinkedCompletion,
        socket: RawFd,
        msghdr: *mut libc::msghdr,
        timeout_ns: u64,
    ) {
        self.submit_linked(
            context.cast(),
            callback as *const (),
            linked_main_recv_thunk::<C>,
            linked_timeout_recv_thunk::<C>,
            completion,
            Operation::RecvMsg { socket, msghdr },
            timeout_ns,
        );
    }

    /// `send` with a follow-up timeout.
    ///
    /// # Safety
    ///
    /// `completion` must stay at a stable address and `buffer` must stay
    /// live until the composite callback fires.
    pub unsafe fn send_with_timeout<C>(
        &mut self,
        context: *mut C,
        callback: LinkedSendCallback<C>,
        completion: &mut LinkedCompletion,
        socket: RawFd,
        buffer: &[u8],
        timeout_ns: u64,
    ) {
        self.submit_linked(
            context.cast(),
            callback as *const (),
            linked_main_send_thunk::<C>,
            linked_timeout_send_thunk::<C>,
            completion,
            Operation::Send {
                socket,
                buffer: buffer.as_ptr(),
                len: buffer_limit(buffer.len()),
            },
            timeout_ns,
        );
    }

    /// `sendmsg` with a follow-up timeout.
    ///
    /// # Safety
    ///
    /// `completion`, `msghdr`, and the buffers it references must stay live
    /// until the composite callback fires.
    pub unsafe fn sendmsg_with_timeout<C>(
        &mut self,
        context: *mut C,
        callback: LinkedSendCallback<C>,
        completion: &mut LinkedCompletion,
        socket: RawFd,
        msghdr: *const libc::msghdr,
        timeout_ns: u64,
    ) {
        self.submit_linked(
            context.cast(),
            callback as *const (),
            linked_main_send_thunk::<C>,
            linked_timeout_send_thunk::<C>,
            completion,
            Operation::SendMsg { socket, msghdr },
            timeout_ns,
        );
    }

    unsafe fn submit(
        &mut self,
        context: *mut (),
        callback: *const (),
        thunk: Thunk,
        completion: &mut Completion,
        operation: Operation,
    ) {
        trace!(
            user_data = completion as *mut Completion as usize,
            operation = operation.tag(),
            "submit"
        );
        completion.prepare(context, callback, thunk, operation);
        self.enqueue(completion);
    }

    unsafe fn submit_linked(
        &mut self,
        context: *mut (),
        callback: *const (),
        main_thunk: Thunk,
        timeout_thunk: Thunk,
        completion: &mut LinkedCompletion,
        operation: Operation,
        timeout_ns: u64,
    ) {
        trace!(
            user_data = &mut completion.main as *mut Completion as usize,
            operation = operation.tag(),
            "submit linked"
        );
        completion.main_result = None;
        completion.timeout_result = None;
        completion
            .main
            .prepare(context, callback, main_thunk, operation);
        completion.timeout.prepare(
            context,
            callback,
            timeout_thunk,
            Operation::link_timeout(timeout_ns),
        );
        completion.main.linked = true;
        self.enqueue_linked(&mut completion.main, &mut completion.timeout);
    }

    /// Runs one harvested completion: retries interrupted operations,
    /// otherwise re-types and invokes the stored callback.
    pub(crate) unsafe fn complete(&mut self, completion: *mut Completion) {
        let interrupted = (*completion).raw_result == -libc::EINTR
            && !matches!((*completion).operation, Operation::Close { .. });
        if interrupted {
            // Retried transparently; the callback never sees EINTR. Any
            // kernel link is already consumed, so the retry stands alone.
            (*completion).linked = false;
            self.enqueue(completion);
            return;
        }
        ((*completion).thunk)(self, completion);
    }
}

unsafe fn invoke<C, T, E>(io: &mut Io, completion: *mut Completion, result: Result<T, E>) {
    let callback: fn(&mut Io, *mut C, *mut Completion, Result<T, E>) =
        mem::transmute((*completion).callback);
    callback(io, (*completion).context.cast(), completion, result);
}

unsafe fn accept_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::accept_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn close_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::close_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn connect_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::connect_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn fsync_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::fsync_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn openat_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::openat_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn read_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::read_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn recv_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::recv_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn send_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::send_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn write_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::write_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn timeout_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::timeout_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn cancel_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::cancel_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

unsafe fn cancel_timeout_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let result = error::cancel_timeout_result((*completion).raw_result);
    invoke::<C, _, _>(io, completion, result);
}

// Linked-pair dispatch. Each half parks its typed result in the enclosing
// `LinkedCompletion`; whichever half reports second fires the composite
// callback. A half that reports first while the other is still in flight
// asks the backend to cancel it (`cancel_linked` is a no-op on io_uring,
// where the kernel link already guarantees the second report).

unsafe fn linked_main_connect_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_main(completion);
    let result = error::connect_result((*completion).raw_result);
    (*linked).main_result = Some(LinkedResult::Connect(result));
    if (*linked).timeout_result.is_none() {
        io.cancel_linked(&mut (*linked).timeout);
        return;
    }
    fire_linked_connect::<C>(io, linked);
}

unsafe fn linked_timeout_connect_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_timeout(completion);
    (*linked).timeout_result = Some(error::timeout_result((*completion).raw_result));
    if (*linked).main_result.is_none() {
        io.cancel_linked(&mut (*linked).main);
        return;
    }
    fire_linked_connect::<C>(io, linked);
}

unsafe fn fire_linked_connect<C>(io: &mut Io, linked: *mut LinkedCompletion) {
    let result = match (*linked).main_result {
        Some(LinkedResult::Connect(result)) => result,
        _ => unreachable!("linked connect fired without a connect result"),
    };
    let callback: LinkedConnectCallback<C> = mem::transmute((*linked).main.callback);
    callback(io, (*linked).main.context.cast(), linked, result);
}

unsafe fn linked_main_recv_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_main(completion);
    let result = error::recv_result((*completion).raw_result);
    (*linked).main_result = Some(LinkedResult::Recv(result));
    if (*linked).timeout_result.is_none() {
        io.cancel_linked(&mut (*linked).timeout);
        return;
    }
    fire_linked_recv::<C>(io, linked);
}

unsafe fn linked_timeout_recv_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_timeout(completion);
    (*linked).timeout_result = Some(error::timeout_result((*completion).raw_result));
    if (*linked).main_result.is_none() {
        io.cancel_linked(&mut (*linked).main);
        return;
    }
    fire_linked_recv::<C>(io, linked);
}

unsafe fn fire_linked_recv<C>(io: &mut Io, linked: *mut LinkedCompletion) {
    let result = match (*linked).main_result {
        Some(LinkedResult::Recv(result)) => result,
        _ => unreachable!("linked recv fired without a recv result"),
    };
    let callback: LinkedRecvCallback<C> = mem::transmute((*linked).main.callback);
    callback(io, (*linked).main.context.cast(), linked, result);
}

unsafe fn linked_main_send_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_main(completion);
    let result = error::send_result((*completion).raw_result);
    (*linked).main_result = Some(LinkedResult::Send(result));
    if (*linked).timeout_result.is_none() {
        io.cancel_linked(&mut (*linked).timeout);
        return;
    }
    fire_linked_send::<C>(io, linked);
}

unsafe fn linked_timeout_send_thunk<C>(io: &mut Io, completion: *mut Completion) {
    let linked = LinkedCompletion::of_timeout(completion);
    (*linked).timeout_result = Some(error::timeout_result((*completion).raw_result));
    if (*linked).main_result.is_none() {
        io.cancel_linked(&mut (*linked).main);
        return;
    }
    fire_linked_send::<C>(io, linked);
}

unsafe fn fire_linked_send<C>(io: &mut Io, linked: *mut LinkedCompletion) {
    let result = match (*linked).main_result {
        Some(LinkedResult::Send(result)) => result,
        _ => unreachable!("linked send fired without a send result"),
    };
    let callback: LinkedSendCallback<C> = mem::transmute((*linked).main.callback);
    callback(io, (*linked).main.context.cast(), linked, result);
}
