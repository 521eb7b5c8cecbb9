//! > **Diagnostic SCTP echo server built on the linux kernel sctp module.**
//!
//! The kernel implements the protocol (congestion control, multi-homing,
//! multi-streaming, retransmission); this crate contributes the diagnostic
//! shell around it:
//!
//! - a timeout-bounded accept/receive loop with graceful shutdown,
//! - dual-mode handling of `SOCK_STREAM` vs `SOCK_SEQPACKET` semantics,
//! - best-effort echo and hex-dump diagnostics.

pub mod asyn;
pub use asyn::*;

pub mod config;
pub use config::*;

pub mod dump;

pub mod sctp;
pub use sctp::*;

pub mod server;
pub use server::{Server, ServerError, POLL_INTERVAL};

pub mod shutdown;
pub use shutdown::ShutdownFlag;
