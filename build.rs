//! Build script for riptide
//!
//! Selects the I/O backend for the target platform and exposes it to the
//! crate as the `io_backend` configuration flag:
//!
//! - **Linux**: `io_uring`. The engine needs kernel 5.6+ for the full
//!   operation set (openat, link timeouts, async cancel); older kernels get a
//!   build warning but the selection is unchanged, since there is no epoll
//!   fallback in this crate.
//! - **macOS / FreeBSD / NetBSD**: `kqueue`.
//!
//! Any other platform sets no flag and `lib.rs` raises a compile error.

use std::process::Command;

fn main() {
    // Emit check-cfg hints so `cfg(io_backend = "...")` is accepted by the compiler
    println!("cargo:rustc-check-cfg=cfg(io_backend, values(\"io_uring\", \"kqueue\"))");

    if cfg!(target_os = "linux") {
        if let Some((major, minor)) = kernel_release() {
            if (major, minor) < (5, 6) {
                println!(
                    "cargo:warning=kernel {major}.{minor} predates the io_uring feature set riptide uses (5.6+)"
                );
            }
        }
        println!("cargo:rustc-cfg=io_backend=\"io_uring\"");
    } else if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd"
    )) {
        println!("cargo:rustc-cfg=io_backend=\"kqueue\"");
    }
}

/// Major and minor of the running kernel, from `uname -r`. Only the two
/// leading dot-separated numbers matter here; everything after them
/// (patch level, distro suffix) is irrelevant to the feature check.
fn kernel_release() -> Option<(u32, u32)> {
    let output = Command::new("uname").arg("-r").output().ok()?;
    let release = String::from_utf8(output.stdout).ok()?;
    let mut numbers = release.trim().splitn(3, '.');
    let major = numbers.next()?.parse().ok()?;
    let minor = numbers.next()?.parse().ok()?;
    Some((major, minor))
}
