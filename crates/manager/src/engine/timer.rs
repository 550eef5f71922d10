//! Discovery timeout
//!
//! When the keyboard cannot be found, the session arms a one-shot timer that
//! later posts [`EngineMessage::DiscoveryTimeout`] to the worker. At most one
//! timer is pending at a time: it stays pending until the worker has handled
//! the timeout or a successful discovery cancels it.

use common::{EngineMessage, EnginePoster};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct DiscoveryTimer {
    runtime: Handle,
    poster: EnginePoster,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryTimer {
    pub fn new(runtime: Handle, poster: EnginePoster, delay: Duration) -> Self {
        Self {
            runtime,
            poster,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Arm the timer unless one is already pending
    ///
    /// Returns true if a new timer was armed.
    pub fn arm(&self) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some() {
            return false;
        }

        let poster = self.poster.clone();
        let delay = self.delay;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Discovery timeout elapsed after {:?}", delay);
            if let Err(e) = poster.post_async(EngineMessage::DiscoveryTimeout).await {
                warn!("Failed to post discovery timeout: {}", e);
            }
        }));

        debug!("Discovery timer armed ({:?})", delay);
        true
    }

    /// Cancel a pending timer
    ///
    /// Returns true if a timer was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().unwrap().take() {
            Some(task) => {
                task.abort();
                debug!("Discovery timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Mark the delivered timeout as handled so the next failure can re-arm
    ///
    /// Returns false if a successful discovery already cancelled the timer,
    /// in which case the delivered timeout is stale.
    pub fn acknowledge(&self) -> bool {
        self.pending.lock().unwrap().take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}

impl Drop for DiscoveryTimer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().ok().and_then(|p| p.take()) {
            task.abort();
        }
    }
}
