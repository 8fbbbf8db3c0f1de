//! Cache Entry Module
//!
//! A single slot in the in-process table: the stored value plus an optional
//! absolute expiry.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::CacheValue;
use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Represents a single cache entry with value and expiry metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value, in its native representation
    pub value: CacheValue,
    /// Absolute expiry, None = never expires
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry. A zero `ttl` means the entry never expires.
    ///
    /// Fails with `InvalidArgument` when `now + ttl` is not representable.
    pub fn new(value: CacheValue, ttl: Duration) -> Result<Self> {
        Ok(Self {
            value,
            expires_at: deadline(ttl)?,
        })
    }

    /// Creates an entry that never expires.
    pub fn persistent(value: CacheValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has expired as of `now`.
    ///
    /// An entry is expired only once `now` is strictly after its expiry. The
    /// lazy check on reads and the background sweep both go through here.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now > expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Remaining lifetime, or None if the entry never expires.
    ///
    /// Returns `Some(Duration::ZERO)` once the expiry has been reached.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    /// Replaces the expiry with `now + ttl`. The entry is unchanged on error.
    pub fn expire_in(&mut self, ttl: Duration) -> Result<()> {
        self.expires_at = Some(expiry_after(ttl)?);
        Ok(())
    }
}

fn deadline(ttl: Duration) -> Result<Option<Instant>> {
    if ttl.is_zero() {
        Ok(None)
    } else {
        expiry_after(ttl).map(Some)
    }
}

fn expiry_after(ttl: Duration) -> Result<Instant> {
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| CacheError::InvalidArgument(format!("invalid expire time {:?}", ttl)))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value".into(), Duration::ZERO).unwrap();

        assert_eq!(entry.value, CacheValue::from("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("test_value".into(), Duration::from_secs(60)).unwrap();

        assert!(entry.expires_at.is_some());
        assert!(!entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = CacheEntry::new("test_value".into(), Duration::from_secs(1)).unwrap();
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("test_value".into(), Duration::from_secs(10)).unwrap();

        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_expiration_boundary_is_strict() {
        let now = Instant::now();
        let entry = CacheEntry {
            value: "test".into(),
            expires_at: Some(now),
        };

        // Exactly at the expiry instant the entry is still live
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_nanos(1)));
    }

    #[test]
    fn test_expire_in_overwrites_deadline() {
        let mut entry = CacheEntry::persistent("v".into());
        entry.expire_in(Duration::from_secs(30)).unwrap();
        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining > Duration::from_secs(29));
    }

    #[test]
    fn test_unrepresentable_ttl_is_rejected() {
        assert!(matches!(
            CacheEntry::new("v".into(), Duration::MAX),
            Err(CacheError::InvalidArgument(_))
        ));

        let mut entry = CacheEntry::new("v".into(), Duration::from_secs(30)).unwrap();
        let before = entry.expires_at;
        assert!(entry.expire_in(Duration::MAX).is_err());
        assert_eq!(entry.expires_at, before);
    }
}
