//! Timer scenarios: run_for_ns pacing, submission-queue overflow, timer
//! cancellation, and completion-storage reuse from inside a callback.

use std::time::{Duration, Instant};

use riptide::{CancelTimeoutError, Completion, Io, TimeoutError};

struct CountCtx {
    fired: usize,
}

fn on_timer(_io: &mut Io, ctx: *mut CountCtx, _completion: *mut Completion, result: Result<(), TimeoutError>) {
    result.expect("timeout failed");
    unsafe { (*ctx).fired += 1 };
}

fn drive_ten_timers(mut io: Io) {
    let mut ctx = CountCtx { fired: 0 };
    let mut completions: [Completion; 10] = Default::default();
    let started = Instant::now();
    unsafe {
        for completion in completions.iter_mut() {
            io.timeout(&mut ctx, on_timer, completion, 20_000_000);
        }
    }

    io.run_for_ns(20_000_000).unwrap();
    for _ in 0..100_000 {
        if ctx.fired == 10 {
            break;
        }
        io.tick().unwrap();
    }
    let elapsed = started.elapsed();

    assert_eq!(ctx.fired, 10);
    assert!(elapsed >= Duration::from_millis(20), "timers fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "timers fired far too late: {elapsed:?}");

    // no stray second callbacks
    io.run_for_ns(5_000_000).unwrap();
    assert_eq!(ctx.fired, 10);
}

#[test]
fn ten_pending_timeouts_fire_together() {
    drive_ten_timers(Io::new(32).unwrap());
}

/// With a single-slot submission queue, nine of the ten records must detour
/// through the unqueued list and still fire.
#[test]
fn submission_queue_overflow_drains_through_unqueued() {
    drive_ten_timers(Io::new(1).unwrap());
}

#[test]
fn run_for_ns_returns_no_earlier_than_asked() {
    let mut io = Io::new(8).unwrap();
    let started = Instant::now();
    io.run_for_ns(10_000_000).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(10));
}

struct CancelTimeoutCtx {
    timeout: Option<Result<(), TimeoutError>>,
    cancel: Option<Result<(), CancelTimeoutError>>,
}

fn on_canceled_timer(
    _io: &mut Io,
    ctx: *mut CancelTimeoutCtx,
    _completion: *mut Completion,
    result: Result<(), TimeoutError>,
) {
    unsafe { (*ctx).timeout = Some(result) };
}

fn on_cancel_timeout(
    _io: &mut Io,
    ctx: *mut CancelTimeoutCtx,
    _completion: *mut Completion,
    result: Result<(), CancelTimeoutError>,
) {
    unsafe { (*ctx).cancel = Some(result) };
}

#[test]
fn cancel_timeout_before_it_fires() {
    let mut io = Io::new(8).unwrap();
    let mut ctx = CancelTimeoutCtx {
        timeout: None,
        cancel: None,
    };
    let ctx_ptr = &mut ctx as *mut CancelTimeoutCtx;
    let mut timer = Completion::new();
    let mut cancel = Completion::new();
    let started = Instant::now();
    unsafe {
        io.timeout(ctx_ptr, on_canceled_timer, &mut timer, 1_000_000_000);
        io.cancel_timeout(ctx_ptr, on_cancel_timeout, &mut cancel, &mut timer);
    }

    for _ in 0..10_000 {
        if ctx.timeout.is_some() && ctx.cancel.is_some() {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(ctx.timeout, Some(Err(TimeoutError::Canceled)));
    assert_eq!(ctx.cancel, Some(Ok(())));
    assert!(started.elapsed() < Duration::from_secs(1), "cancel did not preempt the timer");
}

struct ChainCtx {
    fired: usize,
}

fn on_chain(io: &mut Io, ctx: *mut ChainCtx, completion: *mut Completion, result: Result<(), TimeoutError>) {
    result.expect("timeout failed");
    unsafe {
        (*ctx).fired += 1;
        if (*ctx).fired < 3 {
            // same storage, fresh submission, from inside its own callback
            io.timeout(ctx, on_chain, &mut *completion, 0);
        }
    }
}

#[test]
fn completion_storage_is_reusable_from_its_callback() {
    let mut io = Io::new(8).unwrap();
    let mut ctx = ChainCtx { fired: 0 };
    let mut completion = Completion::new();
    unsafe { io.timeout(&mut ctx, on_chain, &mut completion, 0) };

    for _ in 0..100_000 {
        if ctx.fired == 3 {
            break;
        }
        io.tick().unwrap();
    }

    assert_eq!(ctx.fired, 3);
}
