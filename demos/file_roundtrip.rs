//! Writes a file, syncs it, and reads it back, all through the engine.
//!
//! ```sh
//! cargo run --example file_roundtrip
//! ```

use std::ffi::CString;
use std::os::unix::io::RawFd;

use riptide::{CloseError, Completion, FsyncError, Io, OpenatError, ReadError, WriteError};

struct Ctx {
    fd: RawFd,
    write_buf: [u8; 32],
    read_buf: [u8; 32],
    done: bool,
}

fn on_open(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<RawFd, OpenatError>) {
    let fd = result.expect("openat failed");
    unsafe {
        (*ctx).fd = fd;
        io.write(ctx, on_write, &mut *completion, fd, &(*ctx).write_buf, 0);
    }
}

fn on_write(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<usize, WriteError>) {
    let written = result.expect("write failed");
    println!("wrote {written} bytes");
    unsafe { io.fsync(ctx, on_fsync, &mut *completion, (*ctx).fd) };
}

fn on_fsync(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<(), FsyncError>) {
    result.expect("fsync failed");
    unsafe {
        io.read(ctx, on_read, &mut *completion, (*ctx).fd, &mut (*ctx).read_buf, 0);
    }
}

fn on_read(io: &mut Io, ctx: *mut Ctx, completion: *mut Completion, result: Result<usize, ReadError>) {
    let read = result.expect("read failed");
    println!("read {read} bytes back");
    unsafe {
        assert_eq!((*ctx).read_buf, (*ctx).write_buf);
        io.close(ctx, on_close, &mut *completion, (*ctx).fd);
    }
}

fn on_close(_io: &mut Io, ctx: *mut Ctx, _completion: *mut Completion, result: Result<(), CloseError>) {
    result.expect("close failed");
    unsafe { (*ctx).done = true };
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let path = CString::new("riptide-roundtrip.tmp").unwrap();
    let mut io = Io::new(32)?;
    let mut ctx = Ctx {
        fd: -1,
        write_buf: [0x61; 32],
        read_buf: [0; 32],
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
    while !ctx.done {
        io.tick()?;
    }
    std::fs::remove_file("riptide-roundtrip.tmp")?;
    println!("round trip ok");
    Ok(())
}
