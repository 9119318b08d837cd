//! In-process remoting runtime.
//!
//! Records every command. In *manual* mode events are only produced
//! when a test pushes them through the last sink; in *simulated* mode a
//! fake peer answers on the tokio runtime after a configurable latency.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;

use crate::device::DeviceInfo;
use crate::error::RuntimeError;
use crate::session::{
    ChannelId, ChannelMessage, FailureReason, RemotingRuntime, SessionEventSink,
};

/// First port handed out when a listener asks for an ephemeral port.
pub const EPHEMERAL_PORT_BASE: u16 = 49152;

/// A command the controller issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    Connect { address: String, port: u16 },
    Listen { address: String, handshake_port: u16, transport_port: u16 },
    Disconnect,
    CreateFrameSink { generation: u64 },
    ReleaseFrameSink,
    CreateDataChannel(ChannelId),
    SendData { channel: ChannelId, payload: Bytes },
}

#[derive(Default)]
struct Recorded {
    commands: Vec<RuntimeCommand>,
    sink: Option<SessionEventSink>,
    reject_connects: u32,
    frame_sink: Option<u64>,
}

/// Test-side view of a [`HeadlessRuntime`].
#[derive(Default)]
pub struct RuntimeControl {
    recorded: Mutex<Recorded>,
}

impl RuntimeControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<RuntimeCommand> {
        self.recorded.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.recorded.lock().commands.clear();
    }

    /// Number of Connect and Listen commands issued so far.
    pub fn attempts(&self) -> usize {
        self.recorded
            .lock()
            .commands
            .iter()
            .filter(|c| matches!(c, RuntimeCommand::Connect { .. } | RuntimeCommand::Listen { .. }))
            .count()
    }

    /// Sink of the most recent Connect/Listen.
    pub fn last_sink(&self) -> Option<SessionEventSink> {
        self.recorded.lock().sink.clone()
    }

    /// Generation of the device the frame sink is bound to.
    pub fn frame_sink(&self) -> Option<u64> {
        self.recorded.lock().frame_sink
    }

    /// The next `count` Connect/Listen commands are rejected synchronously.
    pub fn reject_connects(&self, count: u32) {
        self.recorded.lock().reject_connects = count;
    }

    fn record(&self, command: RuntimeCommand) {
        self.recorded.lock().commands.push(command);
    }

    fn begin_attempt(&self, command: RuntimeCommand, sink: SessionEventSink) -> Result<(), RuntimeError> {
        let mut recorded = self.recorded.lock();
        recorded.commands.push(command);
        if recorded.reject_connects > 0 {
            recorded.reject_connects -= 1;
            return Err(RuntimeError::Rejected("peer address not reachable".into()));
        }
        recorded.sink = Some(sink);
        Ok(())
    }
}

/// Behavior of the simulated peer.
#[derive(Debug, Clone)]
pub struct SimulatedPeer {
    pub handle: Handle,
    /// Delay between Connect/Listen and the Connected event.
    pub latency: Duration,
    /// Drop every established session after this long with
    /// `ConnectionLost`.
    pub drop_after: Option<Duration>,
}

pub struct HeadlessRuntime {
    control: Arc<RuntimeControl>,
    peer: Option<SimulatedPeer>,
    next_ephemeral: u16,
}

impl HeadlessRuntime {
    /// Records commands; events come only from the test.
    pub fn manual(control: Arc<RuntimeControl>) -> Self {
        Self {
            control,
            peer: None,
            next_ephemeral: EPHEMERAL_PORT_BASE,
        }
    }

    /// Answers commands like a well-behaved peer.
    pub fn simulated(control: Arc<RuntimeControl>, peer: SimulatedPeer) -> Self {
        Self {
            control,
            peer: Some(peer),
            next_ephemeral: EPHEMERAL_PORT_BASE,
        }
    }

    fn answer_connect(&self, sink: &SessionEventSink) {
        let Some(peer) = &self.peer else { return };
        let sink = sink.clone();
        let latency = peer.latency;
        let drop_after = peer.drop_after;
        peer.handle.spawn(async move {
            tokio::time::sleep(latency).await;
            if !sink.connected() {
                return;
            }
            if let Some(after) = drop_after {
                tokio::time::sleep(after).await;
                debug!(attempt = sink.attempt().0, "simulated peer dropping connection");
                sink.disconnected(FailureReason::ConnectionLost);
            }
        });
    }
}

impl RemotingRuntime for HeadlessRuntime {
    fn connect(&mut self, address: &str, port: u16, sink: SessionEventSink) -> Result<(), RuntimeError> {
        if address.is_empty() {
            return Err(RuntimeError::InvalidAddress("empty host name".into()));
        }
        let command = RuntimeCommand::Connect {
            address: address.to_string(),
            port,
        };
        self.control.begin_attempt(command, sink.clone())?;
        self.answer_connect(&sink);
        Ok(())
    }

    fn listen(
        &mut self,
        address: &str,
        handshake_port: u16,
        transport_port: u16,
        sink: SessionEventSink,
    ) -> Result<(), RuntimeError> {
        let command = RuntimeCommand::Listen {
            address: address.to_string(),
            handshake_port,
            transport_port,
        };
        self.control.begin_attempt(command, sink.clone())?;
        if self.peer.is_some() {
            let port = if transport_port == 0 {
                self.next_ephemeral = self.next_ephemeral.wrapping_add(1).max(EPHEMERAL_PORT_BASE);
                self.next_ephemeral
            } else {
                transport_port
            };
            sink.listening(port);
        }
        self.answer_connect(&sink);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.control.record(RuntimeCommand::Disconnect);
        if self.peer.is_some() {
            if let Some(sink) = self.control.last_sink() {
                sink.disconnected(FailureReason::DisconnectRequest);
            }
        }
    }

    fn create_frame_sink(&mut self, device: &DeviceInfo) -> Result<(), RuntimeError> {
        self.control.record(RuntimeCommand::CreateFrameSink {
            generation: device.generation,
        });
        self.control.recorded.lock().frame_sink = Some(device.generation);
        Ok(())
    }

    fn release_frame_sink(&mut self) {
        self.control.record(RuntimeCommand::ReleaseFrameSink);
        self.control.recorded.lock().frame_sink = None;
    }

    fn create_data_channel(&mut self, channel: ChannelId) -> Result<(), RuntimeError> {
        self.control.record(RuntimeCommand::CreateDataChannel(channel));
        if self.peer.is_some() {
            if let Some(sink) = self.control.last_sink() {
                sink.data_channel_created(channel);
            }
        }
        Ok(())
    }

    fn send_data(&mut self, channel: ChannelId, payload: Bytes) -> Result<(), RuntimeError> {
        self.control.record(RuntimeCommand::SendData {
            channel,
            payload: payload.clone(),
        });
        if self.peer.is_none() {
            return Ok(());
        }
        // The simulated peer answers pings.
        if let Ok(ChannelMessage::Ping { seq }) = ChannelMessage::decode(&payload) {
            if let (Some(sink), Ok(pong)) = (self.control.last_sink(), ChannelMessage::Pong { seq }.encode()) {
                sink.data_received(channel, pong);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::runtime::{AttemptId, SessionEvent, SessionMessage};

    fn sink() -> (SessionEventSink, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionEventSink::new(AttemptId(1), tx), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionMessage>) -> Option<SessionEvent> {
        match rx.try_recv().ok()? {
            SessionMessage::Event { event, .. } => Some(event),
            SessionMessage::Retry { .. } => None,
        }
    }

    #[test]
    fn manual_mode_records_and_stays_quiet() {
        let control = RuntimeControl::new();
        let mut runtime = HeadlessRuntime::manual(control.clone());
        let (sink, mut rx) = sink();

        runtime.connect("10.0.0.2", 8265, sink).unwrap();
        runtime.disconnect();

        assert_eq!(
            control.commands(),
            vec![
                RuntimeCommand::Connect {
                    address: "10.0.0.2".into(),
                    port: 8265
                },
                RuntimeCommand::Disconnect,
            ]
        );
        assert!(control.last_sink().is_some());
        assert!(next_event(&mut rx).is_none());
    }

    #[test]
    fn rejected_connect_keeps_no_sink() {
        let control = RuntimeControl::new();
        let mut runtime = HeadlessRuntime::manual(control.clone());
        control.reject_connects(1);

        assert!(runtime.connect("10.0.0.2", 8265, sink().0).is_err());
        assert!(control.last_sink().is_none());
        assert_eq!(control.attempts(), 1);
    }

    #[test]
    fn empty_address_is_invalid() {
        let mut runtime = HeadlessRuntime::manual(RuntimeControl::new());
        assert!(matches!(
            runtime.connect("", 8265, sink().0),
            Err(RuntimeError::InvalidAddress(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_peer_connects_after_latency() {
        let control = RuntimeControl::new();
        let peer = SimulatedPeer {
            handle: Handle::current(),
            latency: Duration::from_millis(30),
            drop_after: Some(Duration::from_millis(100)),
        };
        let mut runtime = HeadlessRuntime::simulated(control, peer);
        let (sink, mut rx) = sink();

        runtime.listen("0.0.0.0", 0, 0, sink).unwrap();
        assert_eq!(
            next_event(&mut rx),
            Some(SessionEvent::Listening {
                transport_port: EPHEMERAL_PORT_BASE + 1
            })
        );

        tokio::time::sleep(Duration::from_millis(31)).await;
        assert_eq!(next_event(&mut rx), Some(SessionEvent::Connected));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            next_event(&mut rx),
            Some(SessionEvent::Disconnected(FailureReason::ConnectionLost))
        );
    }
}
