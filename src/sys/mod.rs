//! Platform backends.
//!
//! Each backend supplies the kernel-facing half of [`crate::engine::Io`]:
//! `new`, `tick`, `run_for_ns`, `enqueue`, `enqueue_linked`, and
//! `cancel_linked`. The facade in `engine.rs` is backend-agnostic; selection
//! happens at compile time through the `io_backend` flag emitted by
//! `build.rs`.

#[cfg(io_backend = "io_uring")]
pub(crate) mod uring;

#[cfg(io_backend = "kqueue")]
pub(crate) mod kqueue;
