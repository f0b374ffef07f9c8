//! Traffic-signal bridge between one controller and many dashboards.
//!
//! This crate provides:
//!
//! - **Device listener** (TCP, default port 9999) accepting a single
//!   signal controller that streams newline-delimited JSON reports and
//!   receives manual-control commands
//! - **Dashboard `WebSocket`** (`/`, `/ws`, default port 3001) greeting each
//!   client and pushing every report as a `traffic_update` envelope
//! - **Command relay** forwarding client frames that carry
//!   `manual_control` to the controller
//! - **Peer relay** (`/peer`) re-sending each frame to every other peer
//! - **Status endpoint** (`GET /api/status`)
//!
//! # Architecture
//!
//! ```text
//! controller --TCP lines--> LineDecoder --> BridgeState::publish_traffic --> dashboards
//! dashboards --WS text----> relay::handle_client_text --> DeviceSlot --> controller
//! ```
//!
//! All connection state lives in one [`BridgeState`] shared by `Arc`.
//! Every connection runs its own reader task plus a writer task fed by
//! an unbounded queue, so a slow socket never stalls a broadcast.

pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use config::BridgeConfig;
pub use error::{BridgeError, RelayError};
pub use router::build_router;
pub use server::{BridgeServer, ServerError, start_server};
pub use state::BridgeState;
