//! File round-trip through the engine: openat, positioned write, fsync,
//! positioned read, close. One completion record carries the whole chain,
//! resubmitted from inside each callback.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use riptide::{CloseError, Completion, FsyncError, Io, OpenatError, ReadError, WriteError};

struct Ctx {
    fd: RawFd,
    write_buf: [u8; 20],
    read_buf: [u8; 20],
    written: usize,
    read: usize,
    done: bool,
}

fn on_open(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<RawFd, OpenatError>) {
    let fd = result.expect("openat failed");
    unsafe {
        (*ctx).fd = fd;
        io.write(ctx, on_write, &mut *completion, fd, &(*ctx).write_buf, 10);
    }
}

fn on_write(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<usize, WriteError>) {
    unsafe {
        (*ctx).written = result.expect("write failed");
        io.fsync(ctx, on_fsync, &mut *completion, (*ctx).fd);
    }
}

fn on_fsync(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<(), FsyncError>) {
    result.expect("fsync failed");
    unsafe {
        io.read(ctx, on_read, &mut *completion, (*ctx).fd, &mut (*ctx).read_buf, 10);
    }
}

fn on_read(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<usize, ReadError>) {
    unsafe {
        (*ctx).read = result.expect("read failed");
        io.close(ctx, on_close, &mut *completion, (*ctx).fd);
    }
}

fn on_close(_io: &mut Io, ctx: *mut Ctx, _completion: *mut Completion, result: Result<(), CloseError>) {
    result.expect("close failed");
    unsafe { (*ctx).done = true };
}

#[test]
fn write_fsync_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = CString::new(dir.path().join("round-trip").to_str().unwrap()).unwrap();

    let mut io = Io::new(32).unwrap();
    let mut ctx = Ctx {
        fd: -1,
        write_buf: [0x61; 20],
        read_buf: [0; 20],
        written: 0,
        read: 0,
        done: false,
    };
    let mut completion = Completion::new();
    unsafe {
        io.openat(
            &mut ctx,
            on_open,
            &mut completion,
            libc::AT_FDCWD,
            &path,
            libc::O_RDWR | libc::O_CREAT | libc::O_CLOEXEC,
            0o666,
        );
    }

    for _ in 0..100_000 {
        if ctx.done {
            break;
        }
        io.tick().unwrap();
    }

    assert!(ctx.done, "round trip did not finish");
    assert_eq!(ctx.written, 20);
    assert_eq!(ctx.read, 20);
    assert_eq!(ctx.read_buf, ctx.write_buf);
}

struct MissingCtx {
    result: Option<Result<RawFd, OpenatError>>,
}

fn on_open_missing(
    _io: &mut Io,
    ctx: *mut MissingCtx,
    _completion: *mut Completion,
    result: Result<RawFd, OpenatError>,
) {
    unsafe { (*ctx).result = Some(result) };
}

#[test]
fn openat_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = CString::new(dir.path().join("does-not-exist").to_str().unwrap()).unwrap();

    let mut io = Io::new(8).unwrap();
    let mut ctx = MissingCtx { result: None };
    let mut completion = Completion::new();
    unsafe {
        io.openat(
            &mut ctx,
            on_open_missing,
            &mut completion,
            libc::AT_FDCWD,
            &path,
            libc::O_RDONLY,
            0,
        );
    }

    for _ in 0..100_000 {
        if ctx.result.is_some() {
            break;
        }
        io.tick().unwrap();
    }

    assert_eq!(ctx.result, Some(Err(OpenatError::FileNotFound)));
}
