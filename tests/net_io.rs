//! Loopback socket scenarios: accept/connect/send/recv, linked receive
//! timeouts, in-flight cancellation, and the msghdr-based variants.

use std::net::UdpSocket;
use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use riptide::{
    AcceptError, CancelError, Completion, ConnectError, Io, LinkedCompletion, RecvError,
    SendError,
};

fn socket_pair() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair failed");
    for fd in fds {
        unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) };
    }
    (fds[0], fds[1])
}

struct EchoCtx {
    client: RawFd,
    accepted: RawFd,
    send_buf: [u8; 10],
    recv_buf: [u8; 5],
    sent: usize,
    received: usize,
    send_done: bool,
    recv_done: bool,
}

fn on_accept(io: &mut Io, ctx: *mut EchoCtx, completion: *mut Completion, result: Result<RawFd, AcceptError>) {
    let fd = result.expect("accept failed");
    unsafe {
        (*ctx).accepted = fd;
        // reuse the accept record for the server-side receive
        io.recv(ctx, on_recv, &mut *completion, fd, &mut (*ctx).recv_buf);
    }
}

fn on_connect(io: &mut Io, ctx: *mut EchoCtx, completion: *mut Completion, result: Result<(), ConnectError>) {
    result.expect("connect failed");
    unsafe {
        io.send(ctx, on_send, &mut *completion, (*ctx).client, &(*ctx).send_buf);
    }
}

fn on_send(_io: &mut Io, ctx: *mut EchoCtx, _completion: *mut Completion, result: Result<usize, SendError>) {
    unsafe {
        (*ctx).sent = result.expect("send failed");
        (*ctx).send_done = true;
    }
}

fn on_recv(_io: &mut Io, ctx: *mut EchoCtx, _completion: *mut Completion, result: Result<usize, RecvError>) {
    unsafe {
        (*ctx).received = result.expect("recv failed");
        (*ctx).recv_done = true;
    }
}

#[test]
fn accept_connect_send_recv() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let client = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    client.set_nonblocking(true).unwrap();
    let client_fd = client.as_raw_fd();

    let mut io = Io::new(32).unwrap();
    let mut ctx = EchoCtx {
        client: client_fd,
        accepted: -1,
        send_buf: [1, 0, 1, 0, 1, 0, 1, 0, 1, 0],
        recv_buf: [0; 5],
        sent: 0,
        received: 0,
        send_done: false,
        recv_done: false,
    };
    let mut accept_completion = Completion::new();
    let mut connect_completion = Completion::new();
    unsafe {
        io.accept(&mut ctx, on_accept, &mut accept_completion, listener.as_raw_fd());
        io.connect(&mut ctx, on_connect, &mut connect_completion, client_fd, addr);
    }

    for _ in 0..10_000 {
        if ctx.send_done && ctx.recv_done {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(ctx.sent, 10);
    assert_eq!(ctx.received, 5);
    assert_eq!(ctx.recv_buf[..], ctx.send_buf[..5]);
    unsafe { libc::close(ctx.accepted) };
}

struct LinkedCtx {
    calls: usize,
    result: Option<Result<usize, RecvError>>,
    buf: [u8; 8],
}

fn on_linked_recv(
    _io: &mut Io,
    ctx: *mut LinkedCtx,
    _completion: *mut LinkedCompletion,
    result: Result<usize, RecvError>,
) {
    unsafe {
        (*ctx).calls += 1;
        (*ctx).result = Some(result);
    }
}

#[test]
fn recv_with_timeout_fires_on_idle_socket() {
    let (a, b) = socket_pair();

    let mut io = Io::new(32).unwrap();
    let mut ctx = LinkedCtx {
        calls: 0,
        result: None,
        buf: [0; 8],
    };
    let ctx_ptr = &mut ctx as *mut LinkedCtx;
    let mut linked = LinkedCompletion::new();
    unsafe {
        io.recv_with_timeout(
            ctx_ptr,
            on_linked_recv,
            &mut linked,
            a,
            &mut (*ctx_ptr).buf,
            2_000_000,
        );
    }

    for _ in 0..10_000 {
        if ctx.calls > 0 {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }
    // extra grace: the composite must not fire a second time
    io.run_for_ns(5_000_000).unwrap();

    assert_eq!(ctx.calls, 1);
    assert_eq!(ctx.result, Some(Err(RecvError::Canceled)));
    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

#[test]
fn recv_with_timeout_delivers_data_first() {
    let (a, b) = socket_pair();
    let payload = [7u8; 5];
    let queued = unsafe { libc::send(b, payload.as_ptr().cast(), payload.len(), 0) };
    assert_eq!(queued, 5);

    let mut io = Io::new(32).unwrap();
    let mut ctx = LinkedCtx {
        calls: 0,
        result: None,
        buf: [0; 8],
    };
    let ctx_ptr = &mut ctx as *mut LinkedCtx;
    let mut linked = LinkedCompletion::new();
    unsafe {
        io.recv_with_timeout(
            ctx_ptr,
            on_linked_recv,
            &mut linked,
            a,
            &mut (*ctx_ptr).buf,
            50_000_000,
        );
    }

    for _ in 0..10_000 {
        if ctx.calls > 0 {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }
    io.run_for_ns(5_000_000).unwrap();

    assert_eq!(ctx.calls, 1);
    assert_eq!(ctx.result, Some(Ok(5)));
    assert_eq!(ctx.buf[..5], payload[..]);
    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

struct CancelCtx {
    recv: Option<Result<usize, RecvError>>,
    cancel: Option<Result<(), CancelError>>,
    buf: [u8; 4],
}

fn on_canceled_recv(
    _io: &mut Io,
    ctx: *mut CancelCtx,
    _completion: *mut Completion,
    result: Result<usize, RecvError>,
) {
    unsafe { (*ctx).recv = Some(result) };
}

fn on_cancel(
    _io: &mut Io,
    ctx: *mut CancelCtx,
    _completion: *mut Completion,
    result: Result<(), CancelError>,
) {
    unsafe { (*ctx).cancel = Some(result) };
}

#[test]
fn cancel_an_in_flight_recv() {
    let (a, b) = socket_pair();

    let mut io = Io::new(32).unwrap();
    let mut ctx = CancelCtx {
        recv: None,
        cancel: None,
        buf: [0; 4],
    };
    let ctx_ptr = &mut ctx as *mut CancelCtx;
    let mut recv_completion = Completion::new();
    let mut cancel_completion = Completion::new();
    unsafe {
        io.recv(ctx_ptr, on_canceled_recv, &mut recv_completion, a, &mut (*ctx_ptr).buf);
        io.cancel(ctx_ptr, on_cancel, &mut cancel_completion, &mut recv_completion);
    }

    for _ in 0..10_000 {
        if ctx.recv.is_some() && ctx.cancel.is_some() {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(ctx.recv, Some(Err(RecvError::Canceled)));
    assert_eq!(ctx.cancel, Some(Ok(())));
    unsafe {
        libc::close(a);
        libc::close(b);
    }
}

struct BrokenPipeCtx {
    result: Option<Result<usize, SendError>>,
}

fn on_broken_send(
    _io: &mut Io,
    ctx: *mut BrokenPipeCtx,
    _completion: *mut Completion,
    result: Result<usize, SendError>,
) {
    unsafe { (*ctx).result = Some(result) };
}

/// The peer's read side is gone before the send is submitted: the engine
/// must deliver `BrokenPipe` to the callback rather than let `SIGPIPE`
/// take down the process.
#[test]
fn send_to_a_closed_peer_reports_broken_pipe() {
    let (a, b) = socket_pair();
    unsafe { libc::close(b) };

    let mut io = Io::new(8).unwrap();
    let mut ctx = BrokenPipeCtx { result: None };
    let payload = [3u8; 4];
    let mut completion = Completion::new();
    unsafe { io.send(&mut ctx, on_broken_send, &mut completion, a, &payload) };

    for _ in 0..10_000 {
        if ctx.result.is_some() {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(ctx.result, Some(Err(SendError::BrokenPipe)));
    unsafe { libc::close(a) };
}

struct MsgCtx {
    sent: Option<usize>,
    received: Option<usize>,
    send_buf: [u8; 10],
    recv_buf: [u8; 10],
    send_iov: libc::iovec,
    recv_iov: libc::iovec,
    send_hdr: libc::msghdr,
    recv_hdr: libc::msghdr,
}

fn on_sendmsg(
    _io: &mut Io,
    ctx: *mut MsgCtx,
    _completion: *mut Completion,
    result: Result<usize, SendError>,
) {
    unsafe { (*ctx).sent = Some(result.expect("sendmsg failed")) };
}

fn on_recvmsg(
    _io: &mut Io,
    ctx: *mut MsgCtx,
    _completion: *mut Completion,
    result: Result<usize, RecvError>,
) {
    unsafe { (*ctx).received = Some(result.expect("recvmsg failed")) };
}

#[test]
fn sendmsg_recvmsg_round_trip() {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    a.set_nonblocking(true).unwrap();
    b.set_nonblocking(true).unwrap();
    a.connect(b.local_addr().unwrap()).unwrap();

    let mut io = Io::new(32).unwrap();
    let mut ctx = MsgCtx {
        sent: None,
        received: None,
        send_buf: [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
        recv_buf: [0; 10],
        send_iov: unsafe { std::mem::zeroed() },
        recv_iov: unsafe { std::mem::zeroed() },
        send_hdr: unsafe { std::mem::zeroed() },
        recv_hdr: unsafe { std::mem::zeroed() },
    };
    let ctx_ptr = &mut ctx as *mut MsgCtx;
    let mut send_completion = Completion::new();
    let mut recv_completion = Completion::new();
    unsafe {
        (*ctx_ptr).send_iov = libc::iovec {
            iov_base: (*ctx_ptr).send_buf.as_mut_ptr().cast(),
            iov_len: 10,
        };
        (*ctx_ptr).recv_iov = libc::iovec {
            iov_base: (*ctx_ptr).recv_buf.as_mut_ptr().cast(),
            iov_len: 10,
        };
        (*ctx_ptr).send_hdr.msg_iov = &mut (*ctx_ptr).send_iov;
        (*ctx_ptr).send_hdr.msg_iovlen = 1;
        (*ctx_ptr).recv_hdr.msg_iov = &mut (*ctx_ptr).recv_iov;
        (*ctx_ptr).recv_hdr.msg_iovlen = 1;

        io.recvmsg(
            ctx_ptr,
            on_recvmsg,
            &mut recv_completion,
            b.as_raw_fd(),
            &mut (*ctx_ptr).recv_hdr,
        );
        io.sendmsg(
            ctx_ptr,
            on_sendmsg,
            &mut send_completion,
            a.as_raw_fd(),
            &(*ctx_ptr).send_hdr,
        );
    }

    for _ in 0..10_000 {
        if ctx.sent.is_some() && ctx.received.is_some() {
            break;
        }
        io.tick().unwrap();
        std::thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(ctx.sent, Some(10));
    assert_eq!(ctx.received, Some(10));
    assert_eq!(ctx.recv_buf, ctx.send_buf);
}
