#![cfg(io_backend = "io_uring")]

//! Linux io_uring driver.
//!
//! Every operation becomes one submission queue entry whose `user_data` is
//! the completion's address; harvested CQEs write their result back into the
//! record and park it on `completed` until the dispatch sweep. Submissions
//! that find the SQ full wait on `unqueued` and are retried after
//! completions drain. Linked pairs (main + link timeout) acquire both SQE
//! slots or neither, and stay adjacent on `unqueued`, so the kernel always
//! observes the `IOSQE_IO_LINK` chain.

use std::io;

use io_uring::{opcode, squeue, types, IoUring};
use tracing::debug;

use crate::completion::Completion;
use crate::engine::Io;
use crate::fifo::Fifo;
use crate::op::Operation;
use crate::time;

const NANOS_PER_SEC: u64 = 1_000_000_000;

impl Io {
    /// Creates an engine backed by an io_uring ring of `entries` submission
    /// slots. `entries` must be at least the number of concurrently in-flight
    /// operations, or submissions will detour through the unqueued list.
    pub fn new(entries: u32) -> io::Result<Io> {
        let ring = IoUring::new(entries)?;
        debug!(entries, backend = "io_uring", "engine initialized");
        Ok(Io {
            ring,
            unqueued: Fifo::new(),
            completed: Fifo::new(),
        })
    }

    /// One non-blocking engine step: flush submissions, harvest available
    /// completions, run their callbacks, retry unqueued submissions.
    pub fn tick(&mut self) -> io::Result<()> {
        let mut timeouts: usize = 0;
        let mut etime = false;
        self.flush(0, &mut timeouts, &mut etime)?;
        // Only run_for_ns submits the user_data=0 timeouts that set etime.
        debug_assert!(!etime);

        // Submit SQEs that callbacks queued during the flush, instead of
        // letting them wait for the next tick.
        loop {
            match self.ring.submit() {
                Ok(_) => break,
                Err(ref err) if err.raw_os_error() == Some(libc::EINTR) => continue,
                Err(ref err)
                    if matches!(err.raw_os_error(), Some(libc::EBUSY) | Some(libc::EAGAIN)) =>
                {
                    break
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Drives the engine for at least `nanoseconds`, measured on the
    /// monotonic clock.
    ///
    /// Submits an absolute `IORING_TIMEOUT_ABS` timeout with `user_data = 0`
    /// and `count = 1`, then flushes with `wait_nr = 1` until that timeout
    /// reports `ETIME`. The dummy is re-armed whenever another completion
    /// satisfied it first. All dummies are reaped before returning because
    /// their timespec lives in this stack frame.
    pub fn run_for_ns(&mut self, nanoseconds: u64) -> io::Result<()> {
        let deadline = time::monotonic_nanos() + nanoseconds;
        let timespec = types::Timespec::new()
            .sec(deadline / NANOS_PER_SEC)
            .nsec((deadline % NANOS_PER_SEC) as u32);

        let mut timeouts: usize = 0;
        let mut etime = false;
        while !etime {
            let sqe = opcode::Timeout::new(&timespec)
                .count(1)
                .flags(types::TimeoutFlags::ABS)
                .build()
                .user_data(0);
            loop {
                let mut sq = self.ring.submission();
                if unsafe { sq.push(&sqe) }.is_ok() {
                    break;
                }
                drop(sq);
                // The submission queue is full; flush to make room.
                self.flush_submissions(0, &mut timeouts, &mut etime)?;
            }
            timeouts += 1;
            // The amount of time this blocks is bounded by the timeout above.
            self.flush(1, &mut timeouts, &mut etime)?;
        }
        // The kernel decides when the remaining dummies reach the completion
        // queue, so busy-poll rather than risk returning with a live pointer
        // into this frame.
        while timeouts > 0 {
            self.flush_completions(0, &mut timeouts, &mut etime)?;
        }
        Ok(())
    }

    fn flush(&mut self, wait_nr: usize, timeouts: &mut usize, etime: &mut bool) -> io::Result<()> {
        // One syscall flushes queued SQEs and, when asked, waits for
        // completions; afterwards the CQ can be drained without re-entering
        // the kernel.
        self.flush_submissions(wait_nr, timeouts, etime)?;
        self.flush_completions(0, timeouts, etime)?;

        // Loop on a snapshot of the completed list: submissions made by a
        // callback run on the next sweep, which keeps one tick from looping
        // forever on a completion that resubmits itself.
        let mut completed = self.completed.take();
        unsafe {
            while let Some(completion) = completed.pop() {
                self.complete(completion);
            }
        }

        // Same snapshot discipline for the unqueued retries. A head with the
        // linked bit pops its timeout along with it, so the pair reaches the
        // submission queue adjacently or not at all.
        let mut unqueued = self.unqueued.take();
        unsafe {
            while let Some(head) = unqueued.peek() {
                let linked = (*head).linked;
                let main = unqueued.pop().expect("head was just peeked");
                if linked {
                    let timeout = unqueued
                        .pop()
                        .expect("linked completion requeued without its timeout pair");
                    self.enqueue_linked(main, timeout);
                } else {
                    self.enqueue(main);
                }
            }
        }
        Ok(())
    }

    fn flush_submissions(
        &mut self,
        wait_nr: usize,
        timeouts: &mut usize,
        etime: &mut bool,
    ) -> io::Result<()> {
        loop {
            match self.ring.submitter().submit_and_wait(wait_nr) {
                Ok(_) => break,
                Err(ref err) if err.raw_os_error() == Some(libc::EINTR) => continue,
                // The completion queue is overcommitted; drain at least one
                // completion and try again.
                Err(ref err)
                    if matches!(err.raw_os_error(), Some(libc::EBUSY) | Some(libc::EAGAIN)) =>
                {
                    self.flush_completions(1, timeouts, etime)?;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn flush_completions(
        &mut self,
        wait_nr: usize,
        timeouts: &mut usize,
        etime: &mut bool,
    ) -> io::Result<()> {
        let mut wait_remaining = wait_nr;
        loop {
            if wait_remaining > 0 {
                loop {
                    match self.ring.submitter().submit_and_wait(wait_remaining) {
                        Ok(_) => break,
                        Err(ref err) if err.raw_os_error() == Some(libc::EINTR) => continue,
                        Err(ref err)
                            if matches!(
                                err.raw_os_error(),
                                Some(libc::EBUSY) | Some(libc::EAGAIN)
                            ) =>
                        {
                            break
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            let mut harvested: usize = 0;
            for cqe in self.ring.completion() {
                harvested += 1;
                let user_data = cqe.user_data();
                if user_data == 0 {
                    // A run_for_ns dummy. It is only "done" when it expired
                    // (ETIME); a result of 0 means another completion
                    // satisfied its count and it must be re-armed.
                    *timeouts -= 1;
                    if cqe.result() == -libc::ETIME {
                        *etime = true;
                    }
                    continue;
                }
                let completion = user_data as usize as *mut Completion;
                unsafe {
                    (*completion).raw_result = cqe.result();
                    // Callbacks run later, from the completed snapshot, to
                    // keep recursion and stack depth bounded.
                    self.completed.push(completion);
                }
            }
            if harvested >= wait_remaining {
                break;
            }
            wait_remaining -= harvested;
        }
        Ok(())
    }

    /// Translates the operation into an SQE and pushes it, or parks the
    /// record on `unqueued` when the submission queue is full.
    pub(crate) fn enqueue(&mut self, completion: *mut Completion) {
        let sqe = unsafe { prepare_sqe(completion) };
        let mut sq = self.ring.submission();
        if unsafe { sq.push(&sqe) }.is_err() {
            drop(sq);
            unsafe { self.unqueued.push(completion) };
        }
    }

    /// Pushes a main + link-timeout pair. Both SQE slots are acquired before
    /// either entry is written; a partial acquisition would break the kernel
    /// link, so on shortage both records go back to `unqueued` in order.
    pub(crate) fn enqueue_linked(&mut self, main: *mut Completion, timeout: *mut Completion) {
        let main_sqe = unsafe { prepare_sqe(main) }.flags(squeue::Flags::IO_LINK);
        let timeout_sqe = unsafe { prepare_sqe(timeout) };
        let mut sq = self.ring.submission();
        if sq.capacity() - sq.len() < 2 {
            drop(sq);
            unsafe {
                self.unqueued.push(main);
                self.unqueued.push(timeout);
            }
            return;
        }
        unsafe {
            sq.push(&main_sqe).expect("submission slot was checked");
            sq.push(&timeout_sqe).expect("submission slot was checked");
        }
    }

    /// The kernel link already guarantees the other half of a pair reports,
    /// so there is nothing to do here.
    pub(crate) fn cancel_linked(&mut self, _target: *mut Completion) {}
}

/// Builds the SQE for a prepared completion. Pointers into the operation
/// payload (addresses, timespecs) stay valid because the completion record
/// is pinned until its callback fires.
unsafe fn prepare_sqe(completion: *mut Completion) -> squeue::Entry {
    let user_data = completion as usize as u64;
    let entry = match &mut (*completion).operation {
        Operation::Nop => opcode::Nop::new().build(),
        Operation::Accept {
            socket,
            address,
            address_size,
        } => opcode::Accept::new(
            types::Fd(*socket),
            (address as *mut libc::sockaddr_storage).cast::<libc::sockaddr>(),
            address_size as *mut libc::socklen_t,
        )
        .flags(libc::SOCK_CLOEXEC)
        .build(),
        Operation::Cancel { target } => {
            opcode::AsyncCancel::new(*target as usize as u64).build()
        }
        Operation::CancelTimeout { target } => {
            opcode::TimeoutRemove::new(*target as usize as u64).build()
        }
        Operation::Close { fd } => opcode::Close::new(types::Fd(*fd)).build(),
        Operation::Connect {
            socket,
            address,
            address_size,
        } => opcode::Connect::new(
            types::Fd(*socket),
            (address as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
            *address_size,
        )
        .build(),
        Operation::Fsync { fd } => opcode::Fsync::new(types::Fd(*fd)).build(),
        Operation::LinkTimeout { timespec } => {
            opcode::LinkTimeout::new(timespec as *const types::Timespec).build()
        }
        Operation::OpenAt {
            dir_fd,
            path,
            flags,
            mode,
        } => opcode::OpenAt::new(types::Fd(*dir_fd), *path)
            .flags(*flags)
            .mode(*mode)
            .build(),
        Operation::Read {
            fd,
            buffer,
            len,
            offset,
        } => opcode::Read::new(types::Fd(*fd), *buffer, *len as u32)
            .offset(*offset)
            .build(),
        Operation::Recv {
            socket,
            buffer,
            len,
        } => opcode::Recv::new(types::Fd(*socket), *buffer, *len as u32).build(),
        Operation::RecvMsg { socket, msghdr } => {
            opcode::RecvMsg::new(types::Fd(*socket), *msghdr).build()
        }
        Operation::Send {
            socket,
            buffer,
            len,
        } => opcode::Send::new(types::Fd(*socket), *buffer, *len as u32)
            .flags(libc::MSG_NOSIGNAL)
            .build(),
        Operation::SendMsg { socket, msghdr } => {
            opcode::SendMsg::new(types::Fd(*socket), *msghdr)
                .flags(libc::MSG_NOSIGNAL as u32)
                .build()
        }
        Operation::Timeout { timespec } => {
            opcode::Timeout::new(timespec as *const types::Timespec).build()
        }
        Operation::Write {
            fd,
            buffer,
            len,
            offset,
        } => opcode::Write::new(types::Fd(*fd), *buffer, *len as u32)
            .offset(*offset)
            .build(),
    };
    entry.user_data(user_data)
}
