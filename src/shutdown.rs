use std::io::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

/// Process-wide stop request.
///
/// Written once by the signal listener, polled by every serve loop. Once set
/// the flag is never cleared for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registers listeners for SIGINT, SIGTERM and SIGPIPE whose only effect is
/// setting the given flag.
///
/// Must be called before any socket is created; a registration failure is a
/// fatal setup error for the caller.
pub fn install_handlers(flag: &ShutdownFlag) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut pipe = signal(SignalKind::pipe())?;

    let flag = flag.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => debug!("received SIGINT"),
            _ = terminate.recv() => debug!("received SIGTERM"),
            _ = pipe.recv() => warn!("received SIGPIPE, closing down"),
        }
        flag.request();
    });
    Ok(())
}
