//! TCP echo server on the riptide engine.
//!
//! ```sh
//! cargo run --example echo_server
//! nc 127.0.0.1 3131
//! ```

use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, RawFd};

use riptide::{AcceptError, CloseError, Completion, Io, RecvError, SendError};

struct Server {
    listener: RawFd,
    accept_completion: Completion,
}

struct Conn {
    fd: RawFd,
    buf: [u8; 4096],
    completion: Completion,
}

fn on_accept(
    io: &mut Io,
    server: *mut Server,
    _completion: *mut Completion,
    result: Result<RawFd, AcceptError>,
) {
    unsafe {
        match result {
            Ok(fd) => {
                tracing::info!(fd, "connection accepted");
                let conn = Box::into_raw(Box::new(Conn {
                    fd,
                    buf: [0; 4096],
                    completion: Completion::new(),
                }));
                io.recv(conn, on_recv, &mut (*conn).completion, fd, &mut (*conn).buf);
            }
            Err(err) => tracing::warn!(%err, "accept failed"),
        }
        // keep listening; the accept record is reused from its own callback
        io.accept(
            server,
            on_accept,
            &mut (*server).accept_completion,
            (*server).listener,
        );
    }
}

fn on_recv(io: &mut Io, conn: *mut Conn, completion: *mut Completion, result: Result<usize, RecvError>) {
    unsafe {
        let received = result.unwrap_or(0);
        if received == 0 {
            io.close(conn, on_close, &mut *completion, (*conn).fd);
            return;
        }
        // short writes are not re-driven here; good enough for a demo
        let buf = &(&(*conn).buf)[..received];
        io.send(conn, on_send, &mut *completion, (*conn).fd, buf);
    }
}

fn on_send(io: &mut Io, conn: *mut Conn, completion: *mut Completion, result: Result<usize, SendError>) {
    unsafe {
        match result {
            Ok(_) => io.recv(conn, on_recv, &mut *completion, (*conn).fd, &mut (*conn).buf),
            Err(_) => io.close(conn, on_close, &mut *completion, (*conn).fd),
        }
    }
}

fn on_close(
    _io: &mut Io,
    conn: *mut Conn,
    _completion: *mut Completion,
    _result: Result<(), CloseError>,
) {
    unsafe {
        tracing::info!(fd = (*conn).fd, "connection closed");
        drop(Box::from_raw(conn));
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:3131")?;
    listener.set_nonblocking(true)?;
    println!("echoing on 127.0.0.1:3131");

    let mut io = Io::new(256)?;
    let mut server = Server {
        listener: listener.as_raw_fd(),
        accept_completion: Completion::new(),
    };
    let server_ptr = &mut server as *mut Server;
    unsafe {
        io.accept(
            server_ptr,
            on_accept,
            &mut (*server_ptr).accept_completion,
            (*server_ptr).listener,
        );
    }
    loop {
        io.run_for_ns(1_000_000_000)?;
    }
}
