//! Status file change notifications
//!
//! The watcher never touches USB state; it only posts
//! [`EngineMessage::GetReportData`] so the worker drains the report
//! endpoint.

use common::{EngineMessage, EnginePoster, Error, Result};
use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// How often the watcher thread checks for events and the stop flag
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Source of "status file changed" signals for the engine
pub trait ChangeSource: Send {
    /// Begin posting work to `poster`; no-op if already watching
    fn start_watching(&mut self, poster: EnginePoster) -> Result<()>;

    /// Stop posting work and release the watch
    fn stop_watching(&mut self);

    fn is_watching(&self) -> bool;
}

/// inotify-based watcher on a dedicated thread
pub struct InotifyWatcher {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InotifyWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl ChangeSource for InotifyWatcher {
    fn start_watching(&mut self, poster: EnginePoster) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        if !self.path.exists() {
            error!(
                "Status file {} does not exist, not watching",
                self.path.display()
            );
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", self.path.display()),
            )));
        }

        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .map_err(|e| Error::Io(e.into()))?;
        inotify
            .add_watch(
                &self.path,
                AddWatchFlags::IN_MODIFY | AddWatchFlags::IN_ATTRIB | AddWatchFlags::IN_CLOSE_WRITE,
            )
            .map_err(|e| Error::Io(e.into()))?;

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let path = self.path.clone();

        let thread = std::thread::Builder::new()
            .name("status-watcher".to_string())
            .spawn(move || watch_loop(inotify, &path, &stop, &poster))?;

        info!("Watching {}", self.path.display());
        self.thread = Some(thread);
        Ok(())
    }

    fn stop_watching(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.stop.store(true, Ordering::SeqCst);
        if thread.join().is_err() {
            error!("Status watcher thread panicked");
        }
        debug!("Stopped watching {}", self.path.display());
    }

    fn is_watching(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for InotifyWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

fn watch_loop(inotify: Inotify, path: &Path, stop: &AtomicBool, poster: &EnginePoster) {
    while !stop.load(Ordering::SeqCst) {
        match inotify.read_events() {
            Ok(events) => {
                for event in &events {
                    trace!("{} changed ({:?})", path.display(), event.mask);
                }
                post_change(poster, events.len());
            }
            Err(Errno::EAGAIN) => std::thread::sleep(WATCH_POLL_INTERVAL),
            Err(e) => {
                warn!("Failed to read inotify events for {}: {}", path.display(), e);
                std::thread::sleep(WATCH_POLL_INTERVAL);
            }
        }
    }
}

/// Post one drain per batch of inotify events, however many it holds
fn post_change(poster: &EnginePoster, events: usize) -> bool {
    if events == 0 {
        return false;
    }
    if let Err(e) = poster.try_post(EngineMessage::GetReportData) {
        warn!("Dropping status change notification: {}", e);
        return false;
    }
    true
}
