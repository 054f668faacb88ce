//! Conversion of relative TTLs into memcached expiry values.
//!
//! Memcached reads expiry values up to 30 days as relative seconds and
//! anything larger as a Unix timestamp. Every positive TTL is sent as an
//! absolute timestamp so no value ever straddles that threshold.

use chrono::Utc;

/// Converts caller-supplied TTLs for the active client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationPolicy;

impl ExpirationPolicy {
    /// Normalize a relative TTL against the current time.
    ///
    /// `0` never expires. Negative TTLs are clamped to `0` as well.
    pub fn normalize(relative_seconds: i64) -> u32 {
        Self::normalize_at(relative_seconds, Utc::now().timestamp())
    }

    /// Normalize a relative TTL against an explicit Unix time.
    ///
    /// Saturates at `u32::MAX`, the largest expiry the protocol can carry.
    pub fn normalize_at(relative_seconds: i64, now: i64) -> u32 {
        if relative_seconds <= 0 {
            return 0;
        }
        let absolute = now.saturating_add(relative_seconds);
        u32::try_from(absolute).unwrap_or(if absolute < 0 { 0 } else { u32::MAX })
    }
}
