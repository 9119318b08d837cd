//! Remote-session controller.
//!
//! Owns the remoting runtime, the session state machine and the
//! reconnect policy. Runtime events and deferred retries are queued and
//! applied by [`RemoteSessionController::dispatch_pending`], which the
//! host calls once per frame from the rendering thread. Nothing is ever
//! applied from inside a runtime call, so the controller state needs no
//! re-entrant lock.
//!
//! ```text
//!  connect_or_listen ──► Connecting ──(Connected)──► Connected
//!        ▲                   │                           │
//!        │     rejected: retry after delay               │
//!        │                   ▼                           ▼
//!        └──(Recoverable, auto_reconnect)───────── Disconnected
//! ```

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::device::DeviceInfo;
use crate::error::{HoloError, RuntimeError};
use crate::session::channel::{ChannelId, ChannelMessage, STATUS_CHANNEL};
use crate::session::failure::{FailureClass, FailureReason};
use crate::session::options::SessionOptions;
use crate::session::runtime::{
    AttemptId, RemotingRuntime, SessionEvent, SessionEventSink, SessionMessage,
};
use crate::session::state::{RemoteSessionState, SessionPhase};
use crate::task::DeferredTask;

// ── SessionStatus ────────────────────────────────────────────────

/// Snapshot published on every change, for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    /// Transient status line.
    pub message: Option<String>,
    /// Set by a fatal disconnect. Cleared only by a successful connect
    /// or a user-initiated connect.
    pub error: Option<String>,
    /// Transport port reported by a listening runtime.
    pub listening_port: Option<u16>,
    pub last_failure: Option<FailureReason>,
    /// Connect/Listen commands issued, including retries.
    pub attempts: u64,
}

// ── Internal state ───────────────────────────────────────────────

struct PendingRetry {
    token: u64,
    task: DeferredTask,
}

struct Inner {
    runtime: Box<dyn RemotingRuntime>,
    options: SessionOptions,
    state: RemoteSessionState,
    /// Attempt whose events are currently accepted.
    attempt: Option<AttemptId>,
    next_attempt: u64,
    retry: Option<PendingRetry>,
    next_retry: u64,
    channels: BTreeSet<ChannelId>,
    frame_sink: Option<DeviceInfo>,
    status: SessionStatus,
}

impl Inner {
    fn cancel_retry(&mut self) -> bool {
        match self.retry.take() {
            Some(retry) => {
                retry.task.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget the current attempt; its late events are ignored from now on.
    /// The caller has already moved the state to Disconnected.
    fn end_attempt(&mut self) {
        self.attempt = None;
        self.channels.clear();
        self.status.listening_port = None;
    }
}

// ── RemoteSessionController ──────────────────────────────────────

pub struct RemoteSessionController {
    inner: Mutex<Inner>,
    queue_tx: mpsc::UnboundedSender<SessionMessage>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<SessionMessage>>,
    status_tx: watch::Sender<SessionStatus>,
    scheduler: Handle,
}

impl RemoteSessionController {
    /// `scheduler` runs the deferred connect retries.
    pub fn new(runtime: Box<dyn RemotingRuntime>, options: SessionOptions, scheduler: Handle) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            inner: Mutex::new(Inner {
                runtime,
                options,
                state: RemoteSessionState::default(),
                attempt: None,
                next_attempt: 0,
                retry: None,
                next_retry: 0,
                channels: BTreeSet::new(),
                frame_sink: None,
                status: SessionStatus::default(),
            }),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            status_tx,
            scheduler,
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn state(&self) -> RemoteSessionState {
        self.inner.lock().state.clone()
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.lock().options.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    /// Receiver for [`SessionStatus`] updates.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn open_channels(&self) -> Vec<ChannelId> {
        self.inner.lock().channels.iter().copied().collect()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.inner.lock().retry.is_some()
    }

    /// Device the runtime's frame sink is bound to.
    pub fn frame_sink(&self) -> Option<DeviceInfo> {
        self.inner.lock().frame_sink.clone()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Replace the connection options. Only allowed while Disconnected.
    pub fn set_options(&self, options: SessionOptions) -> Result<(), HoloError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_disconnected() {
            return Err(HoloError::InvalidTransition(
                "options can only change while Disconnected",
            ));
        }
        inner.options = options;
        Ok(())
    }

    /// Start connecting (or listening) unless a session is already
    /// active. Clears any persistent error.
    ///
    /// If the runtime rejects the command the state stays Disconnected,
    /// a retry is scheduled after the configured delay, and the error is
    /// returned.
    pub fn connect_or_listen(&self) -> Result<(), HoloError> {
        let mut inner = self.inner.lock();
        self.start_attempt(&mut inner, true)
    }

    /// Request an explicit disconnect. Also cancels a scheduled retry.
    ///
    /// Without an active session this only cancels the retry.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        let cancelled = inner.cancel_retry();

        if inner.state.is_active() {
            if inner.state.disconnect_pending() {
                debug!("disconnect already pending");
                return;
            }
            if let Err(e) = inner.state.request_disconnect() {
                warn!("disconnect: {e}");
                return;
            }
            info!("disconnect requested");
            inner.runtime.disconnect();
            inner.status.message = Some("Disconnecting".into());
            self.publish(&mut inner);
        } else if cancelled {
            info!("scheduled reconnect cancelled");
            inner.status.message = Some("Disconnected".into());
            self.publish(&mut inner);
        }
    }

    /// Apply every queued event and due retry. Returns how many were
    /// applied.
    ///
    /// Single consumer: call from the host's frame thread only. Two
    /// concurrent callers could apply drained messages out of order.
    pub fn dispatch_pending(&self) -> usize {
        let messages: Vec<SessionMessage> = {
            let mut rx = self.queue_rx.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        let count = messages.len();
        for message in messages {
            self.handle_message(message);
        }
        count
    }

    /// Send a message on an open data channel.
    pub fn send_message(&self, channel: ChannelId, message: &ChannelMessage) -> Result<(), HoloError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_connected() {
            return Err(RuntimeError::NotConnected.into());
        }
        if !inner.channels.contains(&channel) {
            return Err(RuntimeError::ChannelClosed(channel.0).into());
        }
        let payload = message.encode()?;
        inner.runtime.send_data(channel, payload)?;
        Ok(())
    }

    /// Bind the runtime's frame sink to `device`.
    pub fn attach_device(&self, device: &DeviceInfo) -> Result<(), HoloError> {
        let mut inner = self.inner.lock();
        inner.runtime.create_frame_sink(device)?;
        inner.frame_sink = Some(device.clone());
        info!(generation = device.generation, "frame sink bound to device");
        Ok(())
    }

    pub fn detach_device(&self) {
        let mut inner = self.inner.lock();
        if inner.frame_sink.take().is_some() {
            inner.runtime.release_frame_sink();
            debug!("frame sink released");
        }
    }

    /// Close the session because the graphics device is going away.
    ///
    /// Returns `true` if a session was active (or about to be retried)
    /// and should be resumed once the device is restored. A session the
    /// user was already disconnecting is not resumed.
    pub fn shutdown_for_device_loss(&self) -> bool {
        let mut inner = self.inner.lock();
        let had_retry = inner.cancel_retry();
        let was_active = inner.state.is_active();
        let resume = had_retry || (was_active && !inner.state.disconnect_pending());

        if was_active {
            warn!(phase = %inner.state.phase(), "closing remote session for device loss");
            inner.runtime.disconnect();
            inner.state.force_disconnect();
            inner.end_attempt();
            inner.status.message = Some("Graphics device lost".into());
            self.publish(&mut inner);
        }
        resume
    }

    // ── Internals ────────────────────────────────────────────────

    fn start_attempt(&self, inner: &mut Inner, user_initiated: bool) -> Result<(), HoloError> {
        if inner.state.is_active() {
            debug!(phase = %inner.state.phase(), "connect ignored: session already active");
            return Ok(());
        }
        inner.cancel_retry();
        if user_initiated {
            inner.status.error = None;
        }

        inner.state.begin_connect()?;
        inner.next_attempt += 1;
        let attempt = AttemptId(inner.next_attempt);
        inner.attempt = Some(attempt);
        inner.status.attempts += 1;
        let sink = SessionEventSink::new(attempt, self.queue_tx.clone());

        let options = inner.options.clone();
        let (handshake_port, transport_port) = options.listen_ports();
        let result = if options.is_listener {
            info!(
                address = %options.address,
                handshake_port,
                transport_port,
                attempt = attempt.0,
                "listening for remote peer"
            );
            inner
                .runtime
                .listen(&options.address, handshake_port, transport_port, sink)
        } else {
            info!(
                address = %options.address,
                port = options.handshake_port,
                attempt = attempt.0,
                "connecting to remote peer"
            );
            inner
                .runtime
                .connect(&options.address, options.handshake_port, sink)
        };

        match result {
            Ok(()) => {
                inner.status.message = Some(if options.is_listener {
                    match handshake_port {
                        0 => format!("Listening on {} (ephemeral ports)", options.address),
                        port => format!("Listening on {}:{port}", options.address),
                    }
                } else {
                    format!("Connecting to {}:{}", options.address, options.handshake_port)
                });
                self.publish(inner);
                Ok(())
            }
            Err(e) => {
                let delay = options.retry_delay();
                warn!("connect attempt rejected: {e}; retrying in {delay:?}");
                inner.state.force_disconnect();
                inner.end_attempt();
                inner.status.message = Some(format!("Connection attempt failed: {e}"));
                self.schedule_retry(inner);
                self.publish(inner);
                Err(e.into())
            }
        }
    }

    fn schedule_retry(&self, inner: &mut Inner) {
        inner.next_retry += 1;
        let token = inner.next_retry;
        let task = DeferredTask::post_after(
            &self.scheduler,
            inner.options.retry_delay(),
            self.queue_tx.clone(),
            SessionMessage::Retry { token },
        );
        inner.retry = Some(PendingRetry { token, task });
    }

    fn handle_message(&self, message: SessionMessage) {
        let mut inner = self.inner.lock();
        match message {
            SessionMessage::Retry { token } => {
                if inner.retry.as_ref().map(|r| r.token) != Some(token) {
                    debug!(token, "ignoring cancelled retry");
                    return;
                }
                inner.retry = None;
                if let Err(e) = self.start_attempt(&mut inner, false) {
                    debug!("retry failed: {e}");
                }
            }
            SessionMessage::Event { attempt, event } => {
                if inner.attempt != Some(attempt) {
                    debug!(attempt = attempt.0, ?event, "ignoring event from a finished attempt");
                    return;
                }
                self.handle_event(&mut inner, event);
            }
        }
    }

    fn handle_event(&self, inner: &mut Inner, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                if let Err(e) = inner.state.complete_connect() {
                    warn!("unexpected connected event: {e}");
                    return;
                }
                info!("remote session connected");
                inner.status.error = None;
                inner.status.last_failure = None;
                inner.status.message = Some("Connected".into());
                if let Err(e) = inner.runtime.create_data_channel(STATUS_CHANNEL) {
                    warn!(channel = %STATUS_CHANNEL, "could not open data channel: {e}");
                }
                self.publish(inner);
            }
            SessionEvent::Listening { transport_port } => {
                info!(transport_port, "runtime is listening");
                inner.status.listening_port = Some(transport_port);
                inner.status.message = Some(format!("Listening on port {transport_port}"));
                self.publish(inner);
            }
            SessionEvent::DataChannelCreated(channel) => {
                debug!(%channel, "data channel open");
                inner.channels.insert(channel);
            }
            SessionEvent::DataReceived { channel, payload } => {
                self.handle_data(inner, channel, &payload);
            }
            SessionEvent::Disconnected(reason) => self.handle_disconnected(inner, reason),
        }
    }

    fn handle_disconnected(&self, inner: &mut Inner, reason: FailureReason) {
        let was_pending = inner.state.disconnect_pending();
        if let Err(e) = inner.state.finish_disconnect() {
            warn!("unexpected disconnected event: {e}");
            inner.state.force_disconnect();
        }
        inner.end_attempt();
        inner.status.last_failure = Some(reason);

        match reason.classify() {
            FailureClass::Explicit => {
                info!(%reason, "remote session disconnected");
                inner.status.message = Some("Disconnected".into());
            }
            FailureClass::Recoverable if inner.options.auto_reconnect && !was_pending => {
                warn!(%reason, "remote session lost; reconnecting");
                inner.status.message = Some(format!("Connection lost ({reason}); reconnecting"));
                if let Err(e) = self.start_attempt(inner, false) {
                    warn!("reconnect failed: {e}");
                }
                return;
            }
            FailureClass::Recoverable => {
                info!(%reason, "remote session lost");
                inner.status.message = Some(format!("Disconnected: {reason}"));
            }
            FailureClass::Fatal => {
                error!(%reason, "remote session failed");
                inner.status.message = Some("Disconnected".into());
                inner.status.error = Some(format!("Disconnected: {reason}"));
            }
        }
        self.publish(inner);
    }

    fn handle_data(&self, inner: &mut Inner, channel: ChannelId, payload: &[u8]) {
        match ChannelMessage::decode(payload) {
            Ok(ChannelMessage::Ping { seq }) => {
                let pong = ChannelMessage::Pong { seq }.encode();
                match pong {
                    Ok(pong) => {
                        if let Err(e) = inner.runtime.send_data(channel, pong) {
                            warn!(%channel, "could not answer ping: {e}");
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }
            Ok(ChannelMessage::Pong { seq }) => debug!(%channel, seq, "pong"),
            Ok(ChannelMessage::Text(text)) => info!(%channel, "peer: {text}"),
            Err(e) => warn!(%channel, len = payload.len(), "undecodable payload: {e}"),
        }
    }

    fn publish(&self, inner: &mut Inner) {
        inner.status.phase = inner.state.phase().clone();
        self.status_tx.send_replace(inner.status.clone());
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::headless::{HeadlessRuntime, RuntimeCommand, RuntimeControl};

    fn controller(options: SessionOptions) -> (Arc<RuntimeControl>, RemoteSessionController) {
        let control = RuntimeControl::new();
        let runtime = HeadlessRuntime::manual(control.clone());
        let controller = RemoteSessionController::new(Box::new(runtime), options, Handle::current());
        (control, controller)
    }

    fn connected(options: SessionOptions) -> (Arc<RuntimeControl>, RemoteSessionController) {
        let (control, controller) = controller(options);
        controller.connect_or_listen().unwrap();
        control.last_sink().unwrap().connected();
        controller.dispatch_pending();
        assert!(controller.state().is_connected());
        (control, controller)
    }

    #[tokio::test]
    async fn connect_issues_command_and_enters_connecting() {
        let (control, controller) = controller(SessionOptions::connect_to("192.168.1.20", 8265));
        controller.connect_or_listen().unwrap();

        assert!(controller.state().is_connecting());
        assert_eq!(
            control.commands(),
            vec![RuntimeCommand::Connect {
                address: "192.168.1.20".into(),
                port: 8265
            }]
        );
        assert_eq!(controller.status().phase, SessionPhase::Connecting);
    }

    #[tokio::test]
    async fn listen_uses_ephemeral_ports_and_reports_port() {
        let options = SessionOptions::listen_on("0.0.0.0", 8265, 8266).with_ephemeral_port(true);
        let (control, controller) = controller(options);
        controller.connect_or_listen().unwrap();
        assert_eq!(
            control.commands(),
            vec![RuntimeCommand::Listen {
                address: "0.0.0.0".into(),
                handshake_port: 0,
                transport_port: 0
            }]
        );
        let message = controller.status().message.unwrap();
        assert!(!message.contains("8265"), "{message}");

        control.last_sink().unwrap().listening(50123);
        controller.dispatch_pending();
        assert_eq!(controller.status().listening_port, Some(50123));
    }

    #[tokio::test]
    async fn connect_while_active_is_a_no_op() {
        let (control, controller) = connected(SessionOptions::default());
        controller.connect_or_listen().unwrap();
        assert_eq!(control.attempts(), 1);
    }

    #[tokio::test]
    async fn connected_opens_data_channel() {
        let (control, controller) = connected(SessionOptions::default());
        assert!(control
            .commands()
            .contains(&RuntimeCommand::CreateDataChannel(STATUS_CHANNEL)));

        control.last_sink().unwrap().data_channel_created(STATUS_CHANNEL);
        controller.dispatch_pending();
        assert_eq!(controller.open_channels(), vec![STATUS_CHANNEL]);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (control, controller) = connected(SessionOptions::default());
        let sink = control.last_sink().unwrap();
        sink.data_channel_created(STATUS_CHANNEL);
        sink.data_received(STATUS_CHANNEL, ChannelMessage::Ping { seq: 4 }.encode().unwrap());
        controller.dispatch_pending();

        let pong = ChannelMessage::Pong { seq: 4 }.encode().unwrap();
        assert!(control.commands().contains(&RuntimeCommand::SendData {
            channel: STATUS_CHANNEL,
            payload: pong
        }));
    }

    #[tokio::test]
    async fn send_message_requires_open_channel() {
        let (control, controller) = connected(SessionOptions::default());
        let text = ChannelMessage::Text("hello".into());
        assert!(matches!(
            controller.send_message(STATUS_CHANNEL, &text),
            Err(HoloError::Runtime(RuntimeError::ChannelClosed(64)))
        ));

        control.last_sink().unwrap().data_channel_created(STATUS_CHANNEL);
        controller.dispatch_pending();
        controller.send_message(STATUS_CHANNEL, &text).unwrap();
    }

    #[tokio::test]
    async fn send_message_requires_connection() {
        let (_, controller) = controller(SessionOptions::default());
        assert!(matches!(
            controller.send_message(STATUS_CHANNEL, &ChannelMessage::Ping { seq: 1 }),
            Err(HoloError::Runtime(RuntimeError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn connection_lost_reconnects() {
        let (control, controller) = connected(SessionOptions::default());
        control.last_sink().unwrap().data_channel_created(STATUS_CHANNEL);
        controller.dispatch_pending();

        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::ConnectionLost);
        controller.dispatch_pending();

        assert!(controller.state().is_connecting());
        assert_eq!(control.attempts(), 2);
        assert!(controller.open_channels().is_empty());
        assert!(controller.status().error.is_none());
    }

    #[tokio::test]
    async fn recoverable_failure_while_connecting_reconnects() {
        let (control, controller) = controller(SessionOptions::default());
        controller.connect_or_listen().unwrap();
        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::HandshakeUnreachable);
        controller.dispatch_pending();

        assert!(controller.state().is_connecting());
        assert_eq!(control.attempts(), 2);
    }

    #[tokio::test]
    async fn connection_lost_without_auto_reconnect_stays_down() {
        let (control, controller) = connected(SessionOptions::default().with_auto_reconnect(false));
        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::ConnectionLost);
        controller.dispatch_pending();

        assert!(controller.state().is_disconnected());
        assert_eq!(control.attempts(), 1);
    }

    #[tokio::test]
    async fn fatal_failure_sets_error_until_user_connects() {
        let (control, controller) = connected(SessionOptions::default());
        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::AuthenticationFailed);
        controller.dispatch_pending();

        assert!(controller.state().is_disconnected());
        assert_eq!(control.attempts(), 1);
        assert!(!controller.has_pending_retry());
        let error = controller.status().error.unwrap();
        assert!(error.contains("authentication failed"));

        controller.connect_or_listen().unwrap();
        assert!(controller.status().error.is_none());
    }

    #[tokio::test]
    async fn every_reason_is_handled_per_its_class() {
        for reason in FailureReason::ALL {
            let (control, controller) = connected(SessionOptions::default());
            control.last_sink().unwrap().disconnected(reason);
            controller.dispatch_pending();

            let status = controller.status();
            assert_eq!(status.last_failure, Some(reason));
            match reason.classify() {
                FailureClass::Explicit => {
                    assert!(controller.state().is_disconnected(), "{reason}");
                    assert!(status.error.is_none(), "{reason}");
                }
                FailureClass::Recoverable => {
                    assert!(controller.state().is_connecting(), "{reason}");
                    assert_eq!(control.attempts(), 2, "{reason}");
                }
                FailureClass::Fatal => {
                    assert!(controller.state().is_disconnected(), "{reason}");
                    assert!(status.error.is_some(), "{reason}");
                    assert_eq!(control.attempts(), 1, "{reason}");
                }
            }
        }
    }

    #[tokio::test]
    async fn explicit_disconnect_round_trip() {
        let (control, controller) = connected(SessionOptions::default());
        controller.disconnect();
        assert!(controller.state().disconnect_pending());
        assert!(controller.state().is_connected());
        assert!(control.commands().contains(&RuntimeCommand::Disconnect));

        // Second request while pending issues nothing new.
        controller.disconnect();
        let disconnects = control
            .commands()
            .iter()
            .filter(|c| **c == RuntimeCommand::Disconnect)
            .count();
        assert_eq!(disconnects, 1);

        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::DisconnectRequest);
        controller.dispatch_pending();
        assert!(controller.state().is_disconnected());
        assert!(!controller.state().disconnect_pending());
    }

    #[tokio::test]
    async fn recoverable_loss_after_disconnect_request_does_not_reconnect() {
        let (control, controller) = connected(SessionOptions::default());
        controller.disconnect();
        control
            .last_sink()
            .unwrap()
            .disconnected(FailureReason::ConnectionLost);
        controller.dispatch_pending();

        assert!(controller.state().is_disconnected());
        assert_eq!(control.attempts(), 1);
    }

    #[tokio::test]
    async fn disconnect_while_disconnected_does_nothing() {
        let (control, controller) = controller(SessionOptions::default());
        controller.disconnect();
        assert!(control.commands().is_empty());
        assert!(controller.state().is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_connect_retries_after_delay() {
        let (control, controller) = controller(SessionOptions::default().with_auto_reconnect(false));
        control.reject_connects(1);

        assert!(controller.connect_or_listen().is_err());
        assert!(controller.state().is_disconnected());
        assert!(controller.has_pending_retry());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(controller.dispatch_pending(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.dispatch_pending(), 1);
        assert!(controller.state().is_connecting());
        assert_eq!(control.attempts(), 2);
        assert!(!controller.has_pending_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_scheduled_retry() {
        let (control, controller) = controller(SessionOptions::default());
        control.reject_connects(1);
        assert!(controller.connect_or_listen().is_err());

        controller.disconnect();
        assert!(!controller.has_pending_retry());

        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.dispatch_pending();
        assert!(controller.state().is_disconnected());
        assert_eq!(control.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_abandons_scheduled_retry() {
        let (control, controller) = controller(SessionOptions::default());
        control.reject_connects(1);
        assert!(controller.connect_or_listen().is_err());
        assert!(controller.has_pending_retry());

        drop(controller);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(control.attempts(), 1);
        assert_eq!(control.commands().len(), 1);
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let (control, controller) = connected(SessionOptions::default());
        let old_sink = control.last_sink().unwrap();

        assert!(controller.shutdown_for_device_loss());
        controller.connect_or_listen().unwrap();
        assert!(controller.state().is_connecting());

        // Late confirmation of the torn-down session.
        old_sink.disconnected(FailureReason::DisconnectRequest);
        old_sink.connected();
        controller.dispatch_pending();
        assert!(controller.state().is_connecting());
    }

    #[tokio::test]
    async fn shutdown_for_device_loss_reports_activity() {
        let (_, controller) = controller(SessionOptions::default());
        assert!(!controller.shutdown_for_device_loss());

        let (control, controller) = connected(SessionOptions::default());
        assert!(controller.shutdown_for_device_loss());
        assert!(controller.state().is_disconnected());
        assert!(control.commands().contains(&RuntimeCommand::Disconnect));
    }

    #[tokio::test]
    async fn shutdown_during_user_disconnect_does_not_resume() {
        let (_, controller) = connected(SessionOptions::default());
        controller.disconnect();
        assert!(!controller.shutdown_for_device_loss());
    }

    #[tokio::test]
    async fn options_change_only_while_disconnected() {
        let (_, active) = connected(SessionOptions::default());
        assert!(matches!(
            active.set_options(SessionOptions::connect_to("10.1.1.1", 1)),
            Err(HoloError::InvalidTransition(_))
        ));

        let (_, idle) = controller(SessionOptions::default());
        idle.set_options(SessionOptions::connect_to("10.1.1.1", 1))
            .unwrap();
        assert_eq!(idle.options().address, "10.1.1.1");
    }

    #[tokio::test]
    async fn frame_sink_follows_device() {
        let (control, controller) = controller(SessionOptions::default());
        let info = DeviceInfo {
            generation: 3,
            adapter: "test".into(),
        };
        controller.attach_device(&info).unwrap();
        assert_eq!(control.frame_sink(), Some(3));
        assert_eq!(controller.frame_sink(), Some(info));

        controller.detach_device();
        controller.detach_device();
        assert_eq!(control.frame_sink(), None);
        let releases = control
            .commands()
            .iter()
            .filter(|c| **c == RuntimeCommand::ReleaseFrameSink)
            .count();
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn status_updates_are_published() {
        let (control, controller) = controller(SessionOptions::default());
        let mut rx = controller.subscribe_status();
        controller.connect_or_listen().unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, SessionPhase::Connecting);

        control.last_sink().unwrap().connected();
        controller.dispatch_pending();
        assert!(matches!(rx.borrow().phase, SessionPhase::Connected { .. }));
    }
}
