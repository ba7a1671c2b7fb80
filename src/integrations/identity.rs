//! Correlation id generation

use anyhow::Result;
use uuid::Uuid;

/// Length of ids produced by [`ShortUuid`]
pub const SHORT_ID_LEN: usize = 8;

/// Source of fresh exchange identifiers
pub trait IdentityProvider: Send + Sync {
    fn new_id(&self) -> Result<String>;
}

/// First eight hex digits of a random v4 UUID
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortUuid;

impl IdentityProvider for ShortUuid {
    fn new_id(&self) -> Result<String> {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SHORT_ID_LEN);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_format() {
        let id = ShortUuid.new_id().unwrap();
        assert_eq!(id.len(), SHORT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_ids_differ() {
        let a = ShortUuid.new_id().unwrap();
        let b = ShortUuid.new_id().unwrap();
        assert_ne!(a, b);
    }
}
