//! The seam between the session controller and the remoting runtime.
//!
//! The runtime takes commands synchronously and reports back through a
//! [`SessionEventSink`]. Sinks only enqueue; the controller applies the
//! queued events on its own thread during `dispatch_pending`, so a
//! runtime may invoke a sink from any thread, including from inside a
//! command call.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::device::DeviceInfo;
use crate::error::RuntimeError;
use crate::session::channel::ChannelId;
use crate::session::failure::FailureReason;

/// Commands the controller issues to the remoting runtime.
pub trait RemotingRuntime: Send {
    /// Start connecting to a listening peer. `Err` means the attempt
    /// never started and no events will follow on `sink`.
    fn connect(&mut self, address: &str, port: u16, sink: SessionEventSink) -> Result<(), RuntimeError>;

    /// Start listening for a peer. Ports of 0 ask for ephemeral ports.
    fn listen(
        &mut self,
        address: &str,
        handshake_port: u16,
        transport_port: u16,
        sink: SessionEventSink,
    ) -> Result<(), RuntimeError>;

    /// Tear the current session down. Confirmed by a Disconnected event.
    fn disconnect(&mut self);

    /// Bind the runtime's frame sink to a graphics device.
    fn create_frame_sink(&mut self, device: &DeviceInfo) -> Result<(), RuntimeError>;

    fn release_frame_sink(&mut self);

    /// Ask the runtime to open a custom data channel. Confirmed by a
    /// DataChannelCreated event.
    fn create_data_channel(&mut self, channel: ChannelId) -> Result<(), RuntimeError>;

    fn send_data(&mut self, channel: ChannelId, payload: Bytes) -> Result<(), RuntimeError>;
}

/// Identifies one Connect/Listen attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(pub u64);

/// Something the remoting runtime reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected(FailureReason),
    /// A listener is accepting on this transport port.
    Listening { transport_port: u16 },
    DataChannelCreated(ChannelId),
    DataReceived { channel: ChannelId, payload: Bytes },
}

/// Work item on the controller's queue.
#[derive(Debug)]
pub(crate) enum SessionMessage {
    Event { attempt: AttemptId, event: SessionEvent },
    Retry { token: u64 },
}

/// Handed to the runtime with every Connect/Listen. Tags each event with
/// the attempt it belongs to so late events from an earlier attempt can
/// be told apart.
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    attempt: AttemptId,
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionEventSink {
    pub(crate) fn new(attempt: AttemptId, tx: mpsc::UnboundedSender<SessionMessage>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Queue an event. Returns `false` once the controller is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(SessionMessage::Event {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }

    pub fn connected(&self) -> bool {
        self.emit(SessionEvent::Connected)
    }

    pub fn disconnected(&self, reason: FailureReason) -> bool {
        self.emit(SessionEvent::Disconnected(reason))
    }

    pub fn listening(&self, transport_port: u16) -> bool {
        self.emit(SessionEvent::Listening { transport_port })
    }

    pub fn data_channel_created(&self, channel: ChannelId) -> bool {
        self.emit(SessionEvent::DataChannelCreated(channel))
    }

    pub fn data_received(&self, channel: ChannelId, payload: Bytes) -> bool {
        self.emit(SessionEvent::DataReceived { channel, payload })
    }
}
