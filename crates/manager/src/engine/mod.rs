//! Keyboard polling engine
//!
//! Wires the device session, state notifier, status watcher and discovery
//! timer to a single worker thread. Every trigger (startup, status file
//! change, discovery timeout) is a message on the engine queue; only the
//! worker performs USB transfers.

pub mod timer;
pub mod worker;

use crate::state::{KeyboardStateListener, ListenerId, StateNotifier};
use crate::status::{ChangeSource, StatusFile};
use crate::usb::{DeviceSession, UsbHost};
use common::{EngineInbox, EngineMessage, EnginePoster, Error, Result, create_engine_queue};
use protocol::{ConnectionState, KEYBOARD_IDENTITY};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use timer::DiscoveryTimer;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use worker::EngineWorker;

/// Tunables of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Timeout of a single USB transfer
    pub transfer_timeout: Duration,
    /// Delay before a failed discovery triggers a host reset
    pub discovery_timeout: Duration,
    /// Wall-clock budget of one report drain
    pub report_budget: Duration,
    /// Connect query sends per check
    pub connect_attempts: u32,
    /// Response reads per connect query send
    pub max_response_reads: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_millis(500),
            discovery_timeout: Duration::from_secs(20),
            report_budget: Duration::from_millis(20),
            connect_attempts: 2,
            max_response_reads: 64,
        }
    }
}

pub struct KeyboardEngine<H: UsbHost> {
    session: Arc<DeviceSession<H>>,
    notifier: Arc<StateNotifier>,
    status: StatusFile,
    settings: EngineSettings,
    poster: EnginePoster,
    inbox: EngineInbox,
    source: Box<dyn ChangeSource>,
    worker: Option<JoinHandle<()>>,
}

impl<H: UsbHost> KeyboardEngine<H> {
    /// Create a stopped engine
    ///
    /// `runtime` drives the discovery timer.
    pub fn new(
        host: H,
        settings: EngineSettings,
        status: StatusFile,
        source: Box<dyn ChangeSource>,
        runtime: Handle,
    ) -> Self {
        let (poster, inbox) = create_engine_queue();
        let timer = DiscoveryTimer::new(runtime, poster.clone(), settings.discovery_timeout);
        let session = Arc::new(DeviceSession::new(
            host,
            KEYBOARD_IDENTITY,
            settings.transfer_timeout,
            timer,
        ));

        Self {
            session,
            notifier: Arc::new(StateNotifier::new()),
            status,
            settings,
            poster,
            inbox,
            source,
            worker: None,
        }
    }

    /// Spawn the worker, queue the initial connect-state check and start
    /// watching the status file
    ///
    /// No-op if already running. A watcher that cannot start is logged; the
    /// engine still runs without report drains.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!("Keyboard engine already running");
            return Ok(());
        }

        let worker = EngineWorker::new(
            self.session.clone(),
            self.notifier.clone(),
            self.status.clone(),
            self.settings,
        );
        let inbox = self.inbox.clone();
        let handle = std::thread::Builder::new()
            .name("keyboard-handler".to_string())
            .spawn(move || worker.run(inbox))?;
        self.worker = Some(handle);

        self.poster.post(EngineMessage::CheckConnectionState)?;

        if let Err(e) = self.source.start_watching(self.poster.clone()) {
            error!("Failed to watch status file: {}", e);
        }

        info!("Keyboard engine started");
        Ok(())
    }

    /// Stop watching, let the worker finish queued work, then join it
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.source.stop_watching();

        if let Err(e) = self.poster.post(EngineMessage::Shutdown) {
            warn!("Failed to post shutdown: {}", e);
        }
        if handle.join().is_err() {
            error!("Keyboard engine worker panicked");
        }

        self.session.timer().cancel();
        // Hand the interfaces back to the kernel
        self.session.invalidate();
        let dropped = self.inbox.clear();
        if dropped > 0 {
            debug!("Dropped {} queued messages", dropped);
        }

        info!("Keyboard engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Run one connect-state check on the calling thread
    ///
    /// Only allowed while the engine is stopped, so transfers stay
    /// serialized.
    pub fn probe(&self) -> Result<Option<ConnectionState>> {
        if self.is_running() {
            return Err(Error::Other(
                "cannot probe while the engine is running".to_string(),
            ));
        }

        let mut worker = EngineWorker::new(
            self.session.clone(),
            self.notifier.clone(),
            self.status.clone(),
            self.settings,
        );
        Ok(worker.check_connection_state())
    }

    pub fn add_listener(&self, listener: Arc<dyn KeyboardStateListener>) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    pub fn notifier(&self) -> &Arc<StateNotifier> {
        &self.notifier
    }

    pub fn session(&self) -> &Arc<DeviceSession<H>> {
        &self.session
    }

    /// Poster for additional triggers
    pub fn poster(&self) -> EnginePoster {
        self.poster.clone()
    }
}

impl<H: UsbHost> Drop for KeyboardEngine<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
