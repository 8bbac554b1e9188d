use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identity of an observed page, element, or coordinator instance.
///
/// Two groups of 16 lowercase hex digits joined by `-`. Generated from fresh
/// randomness on every call, so ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 16] = rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("{}-{}", &hex[..16], &hex[16..]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_format() {
        let id = EntityId::generate();
        let (left, right) = id.as_str().split_once('-').unwrap();
        assert_eq!(left.len(), 16);
        assert_eq!(right.len(), 16);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_entity_ids_are_distinct() {
        let ids: std::collections::HashSet<EntityId> =
            (0..256).map(|_| EntityId::generate()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn test_entity_id_serializes_as_plain_string() {
        let id = EntityId::from("0123456789abcdef-fedcba9876543210");
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            serde_json::json!("0123456789abcdef-fedcba9876543210")
        );
    }
}
