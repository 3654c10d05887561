//! Stored Entry Module
//!
//! Defines the record every backend stores: an encoded payload plus absolute
//! timestamps.

use serde::{Deserialize, Serialize};

// == Entry ==
/// A single stored record with encoded value and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The encoded value (post-pipeline)
    pub value: Vec<u8>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl Entry {
    // == Constructor ==
    /// Creates a new entry written at `now` with an optional absolute expiry.
    pub fn new(value: Vec<u8>, now: u64, expires_at: Option<u64>) -> Self {
        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Approximate footprint used for quota accounting.
    pub fn size_bytes(&self) -> usize {
        // two timestamps
        self.value.len() + 16
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_expiry() {
        let entry = Entry::new(b"test_value".to_vec(), 1_000, None);

        assert_eq!(entry.value, b"test_value");
        assert_eq!(entry.created_at, 1_000);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_entry_expiration() {
        let entry = Entry::new(b"v".to_vec(), 0, Some(1_000));

        assert!(!entry.is_expired_at(0));
        assert!(!entry.is_expired_at(999));
        assert!(entry.is_expired_at(1_000));
        assert!(entry.is_expired_at(1_500));
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = Entry::new(vec![1, 2], 5, Some(9));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["created_at"], 5);
        assert_eq!(json["expires_at"], 9);

        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
