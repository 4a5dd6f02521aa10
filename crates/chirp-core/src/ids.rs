//! Branded ID newtypes.
//!
//! Connection and job identifiers are distinct newtype wrappers around
//! `String` so a job id cannot be passed where a client id is expected.
//! Locally-generated IDs are UUID v7 (time-ordered); job IDs are assigned
//! by the transcription vendor and treated as opaque.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered) with the type prefix.
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// One browser WebSocket connection.
    ClientId,
    "conn"
);

branded_id!(
    /// One outstanding asynchronous vendor job (vendor-assigned, opaque).
    JobId,
    "job"
);
