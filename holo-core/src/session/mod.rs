//! Remote-session management: state machine, failure policy, the
//! remoting-runtime seam and the controller tying them together.

pub mod channel;
pub mod controller;
pub mod failure;
pub mod options;
pub mod runtime;
pub mod state;

pub use channel::{ChannelId, ChannelMessage, STATUS_CHANNEL};
pub use controller::{RemoteSessionController, SessionStatus};
pub use failure::{FailureClass, FailureReason};
pub use options::SessionOptions;
pub use runtime::{AttemptId, RemotingRuntime, SessionEvent, SessionEventSink};
pub use state::{RemoteSessionState, SessionPhase};
