//! Push channel: transport adapter and reconnection policy.

pub mod reconnect;
pub mod transport;

pub use reconnect::{
    is_auth_error_message, ConnectionState, FailureDisposition, ReconnectController,
    ReconnectPolicy,
};
pub use transport::{
    notifications_destination, summary_destination, Frame, PushTransport, TransportEvent,
    WsTransport,
};
