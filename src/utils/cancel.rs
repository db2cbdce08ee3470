//! Cancellation of in-flight backup and restore invocations

use super::command::Killer;
use crate::error::{BackupError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::warn;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    killers: Mutex<Vec<Killer>>,
}

/// Shared cancellation flag.
///
/// Cancelling kills every process registered with the token, which unblocks
/// a read or write stuck on its pipe. The lifecycle still runs finalize
/// afterwards.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let killers = match self.inner.killers.lock() {
            Ok(mut killers) => std::mem::take(&mut *killers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for kill in killers {
            kill();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Kill `killer`'s process on cancellation (immediately if already cancelled)
    pub fn register(&self, killer: Killer) {
        // `cancel` drains under the same lock, so the flag is re-read while holding it
        let mut killers = match self.inner.killers.lock() {
            Ok(killers) => killers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.is_cancelled() {
            drop(killers);
            killer();
            return;
        }
        killers.push(killer);
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BackupError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cancel from a background thread once `timeout` elapses
    pub fn cancel_after(&self, timeout: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            if let Some(inner) = weak.upgrade() {
                warn!("Timeout of {:?} reached, cancelling", timeout);
                CancellationToken { inner }.cancel();
            }
        });
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
