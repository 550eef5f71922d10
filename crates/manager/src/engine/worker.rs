//! Engine worker
//!
//! Owns the transfer buffers and runs every USB exchange. Messages are
//! handled one at a time in queue order; a handler that panics is logged
//! and the worker moves on to the next message.

use crate::engine::EngineSettings;
use crate::state::StateNotifier;
use crate::status::{StatusCommand, StatusFile};
use crate::usb::{Channel, DeviceSession, UsbHost};
use common::{EngineInbox, EngineMessage};
use protocol::{
    ConnectVerdict, ConnectionState, FRAME_SIZE, Frame, decode_connect_state, is_connect_report,
    write_connect_query,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

pub struct EngineWorker<H: UsbHost> {
    session: Arc<DeviceSession<H>>,
    notifier: Arc<StateNotifier>,
    status: StatusFile,
    settings: EngineSettings,
    send_buf: Frame,
    recv_buf: Frame,
}

impl<H: UsbHost> EngineWorker<H> {
    pub fn new(
        session: Arc<DeviceSession<H>>,
        notifier: Arc<StateNotifier>,
        status: StatusFile,
        settings: EngineSettings,
    ) -> Self {
        Self {
            session,
            notifier,
            status,
            settings,
            send_buf: [0u8; FRAME_SIZE],
            recv_buf: [0u8; FRAME_SIZE],
        }
    }

    /// Handle messages until [`EngineMessage::Shutdown`] or the queue closes
    pub fn run(mut self, inbox: EngineInbox) {
        info!("Keyboard engine worker started");

        loop {
            match inbox.recv() {
                Ok(EngineMessage::Shutdown) => {
                    info!("Keyboard engine worker shutting down");
                    break;
                }
                Ok(msg) => self.handle(msg),
                Err(e) => {
                    warn!("Engine queue closed: {}", e);
                    break;
                }
            }
        }

        info!("Keyboard engine worker stopped");
    }

    /// Handle one message, containing any panic
    pub fn handle(&mut self, msg: EngineMessage) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_inner(msg)
        }));

        if let Err(e) = result {
            error!("Panic in engine handler for {:?}: {:?}", msg, e);
        }
    }

    fn handle_inner(&mut self, msg: EngineMessage) {
        trace!("Handling {:?}", msg);
        match msg {
            EngineMessage::CheckConnectionState => {
                self.check_connection_state();
            }
            EngineMessage::GetReportData => {
                self.get_report_data();
            }
            EngineMessage::DiscoveryTimeout => self.discovery_timeout(),
            EngineMessage::Shutdown => {}
        }
    }

    /// Query the keyboard over the command endpoints
    ///
    /// Sends the connect query up to `connect_attempts` times. After each
    /// successful send, responses are read until one decodes to a terminal
    /// verdict, a read fails or `max_response_reads` reads were made.
    /// Returns the terminal state, if any.
    pub fn check_connection_state(&mut self) -> Option<ConnectionState> {
        if !self.session.ensure_command_ready() {
            debug!("Command endpoints not ready, skipping connect-state check");
            return None;
        }

        if let Err(e) = write_connect_query(&mut self.send_buf) {
            error!("Failed to build connect query: {}", e);
            return None;
        }

        for attempt in 1..=self.settings.connect_attempts {
            if !self.session.transfer(Channel::CommandOut, &mut self.send_buf) {
                info!("send connect failed (attempt {})", attempt);
                continue;
            }

            for _ in 0..self.settings.max_response_reads {
                self.recv_buf.fill(0);
                if !self.session.transfer(Channel::CommandIn, &mut self.recv_buf) {
                    debug!("No connect response (attempt {})", attempt);
                    break;
                }

                let verdict = decode_connect_state(&self.recv_buf);
                if let Some(state) = self.apply_verdict(verdict) {
                    return Some(state);
                }
            }
        }

        debug!(
            "No connect-state verdict after {} attempts",
            self.settings.connect_attempts
        );
        None
    }

    /// Drain the report endpoint for the report budget
    ///
    /// Keeps reading while data arrives or the budget has not elapsed; the
    /// first failed read after the budget ends the drain. Returns the number
    /// of connect-state frames seen.
    pub fn get_report_data(&mut self) -> usize {
        if !self.session.ensure_report_ready() {
            debug!("Report endpoint not ready, skipping report drain");
            return 0;
        }

        let start = Instant::now();
        let mut reports = 0;

        loop {
            self.recv_buf.fill(0);
            let has_data = self.session.transfer(Channel::ReportIn, &mut self.recv_buf);

            if has_data {
                if is_connect_report(&self.recv_buf) {
                    reports += 1;
                    let verdict = decode_connect_state(&self.recv_buf);
                    self.apply_verdict(verdict);
                } else {
                    trace!("Ignoring report {:02x?}", &self.recv_buf[..8]);
                }
            } else if start.elapsed() >= self.settings.report_budget {
                break;
            }
        }

        trace!(
            "Report drain finished after {:?} ({} connect reports)",
            start.elapsed(),
            reports
        );
        reports
    }

    fn discovery_timeout(&mut self) {
        if !self.session.timer().acknowledge() {
            debug!("Keyboard found before discovery timeout was handled, skipping reset");
            return;
        }
        warn!("Keyboard not found in time, resetting host link");
        self.status.write_command(StatusCommand::HostReset);
    }

    fn apply_verdict(&self, verdict: ConnectVerdict) -> Option<ConnectionState> {
        match verdict {
            ConnectVerdict::Inconclusive(anomaly) => {
                info!("{}", anomaly);
                None
            }
            verdict => {
                let state = verdict.state()?;
                self.notifier.set_state(state);
                Some(state)
            }
        }
    }
}
