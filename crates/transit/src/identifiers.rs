//! Type-safe, cheaply clonable identifiers for network entities.
//!
//! All identifiers use Arc<str> so snapshots can be shared across the cache
//! and every caller without copying strings.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer).map(Self::from)
            }
        }
    };
}

impl_identifier!(CityIdentifier);
impl_identifier!(StopIdentifier);
impl_identifier!(RouteIdentifier);
impl_identifier!(LineKey);

impl LineKey {
    /// Key handed to stations when no line could be matched at all.
    pub fn fallback() -> Self {
        Self::new(crate::models::types::FALLBACK_LINE_KEY)
    }

    pub fn is_fallback(&self) -> bool {
        self.as_str() == crate::models::types::FALLBACK_LINE_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_equality() {
        let id1 = StopIdentifier::new("stop_123");
        let id2 = StopIdentifier::new("stop_123");
        let id3 = id1.clone();

        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
        assert!(Arc::ptr_eq(&id1.0, &id3.0)); // Clone shares Arc
    }

    #[test]
    fn test_identifier_hash() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(CityIdentifier::new("mumbai"), 42);

        assert_eq!(map.get(&CityIdentifier::new("mumbai")), Some(&42));
    }

    #[test]
    fn test_identifier_serde_as_plain_string() {
        let key = LineKey::new("Blue");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"Blue\"");

        let back: LineKey = serde_json::from_str("\"Blue\"").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_fallback_key() {
        assert!(LineKey::fallback().is_fallback());
        assert!(!LineKey::new("Red").is_fallback());
    }
}
