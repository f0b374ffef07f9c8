//! Shared wire types for the Crossroads traffic-signal bridge.
//!
//! Everything that crosses a socket lives here so the bridge and the
//! signal simulator agree on one format.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for connection identifiers
//! - [`codec`] -- Newline-delimited JSON framing for the device stream
//! - [`envelope`] -- Envelopes pushed to dashboard clients
//! - [`message`] -- Classification of client-originated frames
//! - [`intersection`] -- Typed view of controller reports and commands

pub mod codec;
pub mod envelope;
pub mod ids;
pub mod intersection;
pub mod message;

// Re-export all public types at crate root for convenience.
pub use codec::{DecodeError, LineDecoder, encode_line};
pub use envelope::BridgeEnvelope;
pub use ids::{ClientId, DeviceId};
pub use intersection::{IntersectionReport, LaneStatus, ManualDirective, SignalColor};
pub use message::{CONTROL_FIELD, ClientMessage, ControlCommand};
