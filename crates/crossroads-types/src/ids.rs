//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every live connection gets a UUID v7 so log lines from the same socket
//! can be correlated and registry entries can be compared without holding
//! on to the socket itself.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Identifier for a WebSocket client (dashboard or relay peer).
    ClientId
}

define_id! {
    /// Identifier for one accepted device stream connection.
    ///
    /// A reconnecting controller gets a fresh id, which is how the bridge
    /// tells a stale connection's close apart from the live one.
    DeviceId
}
