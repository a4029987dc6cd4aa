//! Method signatures as seen by the bulk cache layer.
//!
//! Only the shape of parameters and results matters here: whether a parameter
//! is the collection of keys, and whether the method returns a mapping, a
//! collection, or something else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of one declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamShape {
    /// A collection whose elements are individually used as cache keys
    Collection,
    /// Any other parameter
    Scalar,
}

/// Shape of a declared result, or of an actual invocation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnShape {
    /// Key to value mapping
    Mapping,
    /// Collection of values
    Collection,
    /// No value
    Unit,
    /// Any other single value
    Value,
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mapping => "mapping",
            Self::Collection => "collection",
            Self::Unit => "unit",
            Self::Value => "value",
        };
        f.write_str(name)
    }
}

/// Identity and shape of an intercepted method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub declaring_type: String,
    pub name: String,
    pub params: Vec<ParamShape>,
    pub returns: ReturnShape,
}

impl MethodSignature {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<ParamShape>,
        returns: ReturnShape,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params,
            returns,
        }
    }

    /// A method with no parameters materializes its whole source.
    pub fn is_find_all(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of collection-typed parameters.
    pub fn collection_params(&self) -> usize {
        self.params
            .iter()
            .filter(|p| matches!(p, ParamShape::Collection))
            .count()
    }

    /// Fully qualified name, `Type::method`.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.declaring_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match param {
                ParamShape::Collection => f.write_str("collection")?,
                ParamShape::Scalar => f.write_str("scalar")?,
            }
        }
        write!(f, ") -> {}", self.returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_all_detection() {
        let find_all = MethodSignature::new("Repo", "find_all", vec![], ReturnShape::Mapping);
        assert!(find_all.is_find_all());

        let by_ids = MethodSignature::new(
            "Repo",
            "find_by_ids",
            vec![ParamShape::Collection],
            ReturnShape::Mapping,
        );
        assert!(!by_ids.is_find_all());
        assert_eq!(by_ids.collection_params(), 1);
    }

    #[test]
    fn test_signature_display() {
        let sig = MethodSignature::new(
            "Repo",
            "delete",
            vec![ParamShape::Collection, ParamShape::Scalar],
            ReturnShape::Unit,
        );
        assert_eq!(sig.to_string(), "Repo::delete(collection, scalar) -> unit");
        assert_eq!(sig.qualified_name(), "Repo::delete");
    }
}
