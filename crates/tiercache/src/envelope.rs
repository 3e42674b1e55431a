//! Stored value wrapper carrying creation time and TTL metadata
//!
//! Serialized as `{"expired_seconds": i64, "created_at": RFC 3339, "data": ...}`.
//! `expired_seconds` follows these rules:
//! - `> 0`: the entry expires `expired_seconds` after `created_at`
//! - `-1`: the entry never expires
//! - any other value `<= 0`: the entry is already expired

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Lifetime;
use crate::error::Result;

/// `expired_seconds` written when no TTL is supplied
pub const NEVER_EXPIRES: i64 = -1;

/// Whole seconds stored for `ttl`
///
/// A fraction of a second rounds up, so a short but non-zero TTL still
/// reaches the store as a live entry. Zero stays zero.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0))
}

/// Cache entry as written to a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Lifetime in whole seconds, see the module docs
    pub expired_seconds: i64,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// The stored value
    pub data: Value,
}

impl Envelope {
    /// Wrap `data` written now with an optional TTL
    ///
    /// `Some(Duration::ZERO)` is expired on the next read. Other TTLs are
    /// counted in whole seconds, rounding up (see [`ttl_seconds`]).
    pub fn new(data: Value, ttl: Option<Duration>) -> Self {
        Self::at(data, ttl, Utc::now())
    }

    pub(crate) fn at(data: Value, ttl: Option<Duration>, created_at: DateTime<Utc>) -> Self {
        let expired_seconds = match ttl {
            None => NEVER_EXPIRES,
            Some(ttl) => i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX),
        };
        Self {
            expired_seconds,
            created_at,
            data,
        }
    }

    /// Instant past which the entry is gone, `None` for persistent entries
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.expired_seconds == NEVER_EXPIRES {
            return None;
        }
        let secs = self.expired_seconds.max(0);
        Some(
            chrono::Duration::try_seconds(secs)
                .and_then(|lifetime| self.created_at.checked_add_signed(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Whether the entry is expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            None => false,
            Some(_) if self.expired_seconds <= 0 => true,
            Some(at) => now > at,
        }
    }

    /// Remaining lifetime at `now`, `None` once expired
    pub fn lifetime(&self, now: DateTime<Utc>) -> Option<Lifetime> {
        if self.is_expired(now) {
            return None;
        }
        match self.expires_at() {
            None => Some(Lifetime::Persistent),
            Some(at) => {
                let remaining = (at - now).to_std().unwrap_or(Duration::ZERO);
                Some(Lifetime::Remaining(remaining))
            }
        }
    }

    /// Serialize to JSON bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON bytes
    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}
