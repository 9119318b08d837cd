//! Why a remote session ended, and what to do about it.

use serde::{Deserialize, Serialize};

/// Reason carried by every `OnDisconnected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    None,
    Unknown,
    NoServerCertificate,
    HandshakePortBusy,
    HandshakeUnreachable,
    HandshakeConnectionFailed,
    AuthenticationFailed,
    RemotingVersionMismatch,
    IncompatibleTransportProtocols,
    HandshakeFailed,
    TransportPortBusy,
    TransportUnreachable,
    TransportConnectionFailed,
    ProtocolVersionMismatch,
    ProtocolError,
    VideoCodecNotAvailable,
    Canceled,
    ConnectionLost,
    DeviceLost,
    DisconnectRequest,
    HandshakeNetworkUnreachable,
    HandshakeConnectionRefused,
    VideoFormatNotAvailable,
    PeerDisconnectRequest,
    PeerDisconnectTimeout,
    SessionOpenTimeout,
    RemotingHandshakeTimeout,
    InternalError,
}

/// How the controller reacts to a [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Normal teardown requested by either side. No further action.
    Explicit,
    /// Temporary network trouble. Reconnect if enabled.
    Recoverable,
    /// Needs user action. Surfaced as a persistent error, never retried.
    Fatal,
}

impl FailureReason {
    pub const ALL: [FailureReason; 28] = [
        Self::None,
        Self::Unknown,
        Self::NoServerCertificate,
        Self::HandshakePortBusy,
        Self::HandshakeUnreachable,
        Self::HandshakeConnectionFailed,
        Self::AuthenticationFailed,
        Self::RemotingVersionMismatch,
        Self::IncompatibleTransportProtocols,
        Self::HandshakeFailed,
        Self::TransportPortBusy,
        Self::TransportUnreachable,
        Self::TransportConnectionFailed,
        Self::ProtocolVersionMismatch,
        Self::ProtocolError,
        Self::VideoCodecNotAvailable,
        Self::Canceled,
        Self::ConnectionLost,
        Self::DeviceLost,
        Self::DisconnectRequest,
        Self::HandshakeNetworkUnreachable,
        Self::HandshakeConnectionRefused,
        Self::VideoFormatNotAvailable,
        Self::PeerDisconnectRequest,
        Self::PeerDisconnectTimeout,
        Self::SessionOpenTimeout,
        Self::RemotingHandshakeTimeout,
        Self::InternalError,
    ];

    /// Anything not listed as Explicit or Recoverable is Fatal.
    pub fn classify(self) -> FailureClass {
        match self {
            Self::None | Self::DisconnectRequest | Self::PeerDisconnectRequest => {
                FailureClass::Explicit
            }
            Self::HandshakeUnreachable
            | Self::HandshakeNetworkUnreachable
            | Self::TransportUnreachable
            | Self::ConnectionLost => FailureClass::Recoverable,
            _ => FailureClass::Fatal,
        }
    }

    pub fn is_recoverable(self) -> bool {
        self.classify() == FailureClass::Recoverable
    }

    fn description(self) -> &'static str {
        match self {
            Self::None => "no failure",
            Self::Unknown => "unknown failure",
            Self::NoServerCertificate => "no server certificate",
            Self::HandshakePortBusy => "handshake port busy",
            Self::HandshakeUnreachable => "handshake unreachable",
            Self::HandshakeConnectionFailed => "handshake connection failed",
            Self::AuthenticationFailed => "authentication failed",
            Self::RemotingVersionMismatch => "remoting version mismatch",
            Self::IncompatibleTransportProtocols => "incompatible transport protocols",
            Self::HandshakeFailed => "handshake failed",
            Self::TransportPortBusy => "transport port busy",
            Self::TransportUnreachable => "transport unreachable",
            Self::TransportConnectionFailed => "transport connection failed",
            Self::ProtocolVersionMismatch => "protocol version mismatch",
            Self::ProtocolError => "protocol error",
            Self::VideoCodecNotAvailable => "video codec not available",
            Self::Canceled => "canceled",
            Self::ConnectionLost => "connection lost",
            Self::DeviceLost => "remote device lost",
            Self::DisconnectRequest => "disconnect requested",
            Self::HandshakeNetworkUnreachable => "handshake network unreachable",
            Self::HandshakeConnectionRefused => "handshake connection refused",
            Self::VideoFormatNotAvailable => "video format not available",
            Self::PeerDisconnectRequest => "peer requested disconnect",
            Self::PeerDisconnectTimeout => "peer disconnect timeout",
            Self::SessionOpenTimeout => "session open timeout",
            Self::RemotingHandshakeTimeout => "remoting handshake timeout",
            Self::InternalError => "internal error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
