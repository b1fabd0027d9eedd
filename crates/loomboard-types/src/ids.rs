//! Typed identifiers for records, clients, and sessions.
//!
//! Record ids are prefixed strings (`shape:<hex>`, `page:<hex>`, …) so they
//! stay meaningful in client payloads and logs. They are opaque to the
//! store: nothing is ever derived from the text beyond display. Client ids
//! and session codes are supplied by the outside world and wrapped without
//! interpretation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A record identifier. Prefixed, globally unique, opaque to the store.
#[derive(Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

/// A connected client identifier (supplied by the transport layer).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

/// An opaque session code. One room actor exists per code.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident) => {
        impl $T {
            /// Wrap an externally supplied identifier.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($T), self.0)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

impl_string_id!(RecordId);
impl_string_id!(ClientId);
impl_string_id!(SessionCode);

impl RecordId {
    fn minted(prefix: &str) -> Self {
        Self(format!("{}:{}", prefix, uuid::Uuid::new_v4().as_simple()))
    }

    /// Mint a fresh shape id.
    pub fn shape() -> Self {
        Self::minted("shape")
    }

    /// Mint a fresh page id.
    pub fn page() -> Self {
        Self::minted("page")
    }

    /// Mint a fresh document id.
    pub fn document() -> Self {
        Self::minted("document")
    }

    /// Mint a fresh binding id.
    pub fn binding() -> Self {
        Self::minted("binding")
    }
}
