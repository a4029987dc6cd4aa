//! Per-element cache keys.
//!
//! Every element of a batch maps to exactly one `CacheKey`. Keys are derived
//! from JSON values so that an element's natural identity and the value an
//! expression computes for it agree: the identity key of `7` and the key an
//! expression like `#result.id` yields for an item with `id: 7` are the same.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BulkCacheResult, ExpressionError};

/// A pre-computed key addressing one entry in a cache.
///
/// The inner string is the canonical JSON rendering of the key value.
/// `serde_json` keeps object fields sorted, so structurally equal values
/// always render to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an already evaluated value.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self(value.to_string())
    }

    /// Build a key from the natural identity of an element.
    pub fn of<T: Serialize + ?Sized>(element: &T) -> BulkCacheResult<Self> {
        let value = serde_json::to_value(element).map_err(|e| ExpressionError::KeyDerivation {
            reason: e.to_string(),
        })?;
        Ok(Self::from_value(&value))
    }

    /// Build a key from raw text, bypassing JSON rendering.
    ///
    /// Intended for key generators that already produce a canonical string.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The canonical text of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct ItemId {
        id: u64,
    }

    #[test]
    fn test_identity_matches_evaluated_value() {
        let identity = CacheKey::of(&7u64).unwrap();
        let evaluated = CacheKey::from_value(&json!(7));
        assert_eq!(identity, evaluated);
    }

    #[test]
    fn test_struct_identity_is_stable() {
        let a = CacheKey::of(&ItemId { id: 1 }).unwrap();
        let b = CacheKey::from_value(&json!({ "id": 1 }));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"id":1}"#);
    }

    #[test]
    fn test_string_and_number_keys_differ() {
        let number = CacheKey::of(&1u32).unwrap();
        let text = CacheKey::of("1").unwrap();
        assert_ne!(number, text);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Distinct integers never share a key.
        #[test]
        fn prop_integer_keys_are_injective(a in any::<i64>(), b in any::<i64>()) {
            let ka = CacheKey::of(&a).unwrap();
            let kb = CacheKey::of(&b).unwrap();
            prop_assert_eq!(a == b, ka == kb);
        }
    }
}
