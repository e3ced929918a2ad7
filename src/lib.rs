//! riptide: a single-threaded, completion-based async I/O engine.
//!
//! The engine exposes POSIX-style file-descriptor operations (accept,
//! connect, close, read, write, recv, send, recvmsg, sendmsg, fsync, openat,
//! timeouts, cancellation) behind one submit/tick surface, on top of two
//! native backends selected at compile time:
//!
//! - **Linux**: io_uring, driven submission-first.
//! - **macOS / BSD**: kqueue, with completion semantics synthesized over
//!   readiness.
//!
//! A caller owns the storage for every in-flight operation: it fills a
//! [`Completion`] through a submitter together with a context pointer and a
//! typed callback, then drives [`Io::tick`] (or [`Io::run_for_ns`]); the
//! engine invokes the callback exactly once with the operation's typed
//! result. Nothing is allocated inside the event loop.
//!
//! Main I/O operations can be chained to a follow-up timeout through a
//! [`LinkedCompletion`] (`connect_with_timeout`, `recv_with_timeout`, ...):
//! whichever half finishes first cancels the other, and the composite
//! callback fires once with the main result.
//!
//! # Example
//!
//! ```no_run
//! use riptide::{Completion, Io};
//!
//! struct Ctx {
//!     fired: bool,
//! }
//!
//! fn on_timeout(
//!     _io: &mut Io,
//!     ctx: *mut Ctx,
//!     _completion: *mut Completion,
//!     result: Result<(), riptide::TimeoutError>,
//! ) {
//!     result.unwrap();
//!     unsafe { (*ctx).fired = true };
//! }
//!
//! fn main() -> std::io::Result<()> {
//!     let mut io = Io::new(32)?;
//!     let mut ctx = Ctx { fired: false };
//!     let mut completion = Completion::new();
//!     unsafe { io.timeout(&mut ctx, on_timeout, &mut completion, 10_000_000) };
//!     while !ctx.fired {
//!         io.tick()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Threading
//!
//! One engine instance is driven by exactly one thread. Callbacks run
//! synchronously from the dispatcher; they may submit follow-up operations
//! (processed on the next sweep) but must not block or re-enter `tick`.

#[cfg(not(any(io_backend = "io_uring", io_backend = "kqueue")))]
compile_error!("riptide requires Linux io_uring or a kqueue-capable BSD");

mod completion;
mod engine;
mod error;
mod fifo;
mod op;
mod sys;
mod time;

pub use completion::{Completion, LinkedCompletion};
pub use engine::{
    AcceptCallback, CancelCallback, CancelTimeoutCallback, CloseCallback, ConnectCallback,
    FsyncCallback, Io, LinkedConnectCallback, LinkedRecvCallback, LinkedSendCallback,
    OpenatCallback, ReadCallback, RecvCallback, SendCallback, TimeoutCallback, WriteCallback,
};
pub use error::{
    AcceptError, CancelError, CancelTimeoutError, CloseError, ConnectError, FsyncError,
    OpenatError, ReadError, RecvError, SendError, TimeoutError, WriteError,
};
pub use op::buffer_limit;
