use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::error::SymlinkError;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire SIGINT and SIGTERM to this flag.
    pub fn register_signals(&self) -> Result<(), SymlinkError> {
        for signal in [SIGINT, SIGTERM] {
            // Registered first so it only fires when the flag was already set.
            signal_hook::flag::register_conditional_shutdown(signal, 130, Arc::clone(&self.flag))
                .map_err(|err| SymlinkError::Filesystem(format!("register signal handler: {err}")))?;
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .map_err(|err| SymlinkError::Filesystem(format!("register signal handler: {err}")))?;
        }
        Ok(())
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
