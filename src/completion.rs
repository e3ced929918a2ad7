//! Caller-owned completion records.
//!
//! A [`Completion`] is the only per-operation storage the engine uses: the
//! caller provides it, the engine threads it through its queues and hands its
//! address to the kernel, and the callback returns ownership to the caller.
//! The record must therefore keep a stable address from submission until its
//! callback has fired.
//!
//! The user callback is stored type-erased: the fn pointer itself as
//! `*const ()`, next to a thunk monomorphized over the caller's context type
//! and the operation kind. At dispatch the thunk re-types both, decodes
//! `raw_result` into the operation's typed result, and invokes the user
//! callback.

use std::mem;
use std::ptr;

use crate::engine::Io;
use crate::error::{ConnectError, RecvError, SendError, TimeoutError};
use crate::op::Operation;

pub(crate) type Thunk = unsafe fn(&mut Io, *mut Completion);

/// One in-flight operation.
///
/// Create with [`Completion::new`] (or `Default`) and pass a `&mut` to a
/// submitter. The storage may be reused for a fresh submission once the
/// callback has fired, including from inside that callback.
pub struct Completion {
    pub(crate) operation: Operation,
    pub(crate) context: *mut (),
    pub(crate) callback: *const (),
    pub(crate) thunk: Thunk,
    /// Raw kernel result: a non-negative value or a negated errno.
    pub(crate) raw_result: i32,
    /// Intrusive queue link; null when the record is not queued.
    pub(crate) next: *mut Completion,
    /// The record is the main half of a linked pair and must be submitted
    /// together with the timeout record that follows it.
    pub(crate) linked: bool,
}

impl Completion {
    pub const fn new() -> Completion {
        Completion {
            operation: Operation::Nop,
            context: ptr::null_mut(),
            callback: ptr::null(),
            thunk: nop_thunk,
            raw_result: 0,
            next: ptr::null_mut(),
            linked: false,
        }
    }

    /// Rebinds the record for a fresh submission.
    pub(crate) fn prepare(
        &mut self,
        context: *mut (),
        callback: *const (),
        thunk: Thunk,
        operation: Operation,
    ) {
        self.operation = operation;
        self.context = context;
        self.callback = callback;
        self.thunk = thunk;
        self.raw_result = 0;
        self.next = ptr::null_mut();
        self.linked = false;
    }
}

impl Default for Completion {
    fn default() -> Completion {
        Completion::new()
    }
}

unsafe fn nop_thunk(_io: &mut Io, _completion: *mut Completion) {}

/// The main half's typed result, parked until the timeout half reports.
#[derive(Clone, Copy)]
pub(crate) enum LinkedResult {
    Connect(Result<(), ConnectError>),
    Recv(Result<usize, RecvError>),
    Send(Result<usize, SendError>),
}

/// Storage for a main operation plus its follow-up timeout, submitted as one
/// atomic pair.
///
/// The composite user callback fires exactly once, with the main result, and
/// only after both halves have reported. Exactly one half surfaces
/// `Canceled`: the timeout when the main operation won the race, the main
/// operation when the timeout fired first.
pub struct LinkedCompletion {
    pub(crate) main: Completion,
    pub(crate) timeout: Completion,
    pub(crate) main_result: Option<LinkedResult>,
    pub(crate) timeout_result: Option<Result<(), TimeoutError>>,
}

impl LinkedCompletion {
    pub const fn new() -> LinkedCompletion {
        LinkedCompletion {
            main: Completion::new(),
            timeout: Completion::new(),
            main_result: None,
            timeout_result: None,
        }
    }

    /// Recovers the pair from the address of its embedded main half.
    ///
    /// # Safety
    ///
    /// `completion` must be the `main` field of a live `LinkedCompletion`.
    pub(crate) unsafe fn of_main(completion: *mut Completion) -> *mut LinkedCompletion {
        completion
            .byte_sub(mem::offset_of!(LinkedCompletion, main))
            .cast()
    }

    /// Recovers the pair from the address of its embedded timeout half.
    ///
    /// # Safety
    ///
    /// `completion` must be the `timeout` field of a live `LinkedCompletion`.
    pub(crate) unsafe fn of_timeout(completion: *mut Completion) -> *mut LinkedCompletion {
        completion
            .byte_sub(mem::offset_of!(LinkedCompletion, timeout))
            .cast()
    }
}

impl Default for LinkedCompletion {
    fn default() -> LinkedCompletion {
        LinkedCompletion::new()
    }
}
