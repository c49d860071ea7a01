//! Content classes
//!
//! A content class identifies the path/layout semantics a repository serves
//! (e.g. `maven2` vs `maven1`). Only repositories with mutually compatible
//! content classes may be aggregated into one group.

use serde::{Deserialize, Serialize};

/// Identifies a repository layout family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentClass {
    id: String,
}

impl ContentClass {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Maven 2 layout, the default for new repositories.
    pub fn maven2() -> Self {
        Self::new("maven2")
    }

    /// Legacy Maven 1 layout.
    pub fn maven1() -> Self {
        Self::new("maven1")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether content of `other`'s class may be served alongside this class.
    ///
    /// Compatibility is kept as a method (rather than plain equality at call
    /// sites) so asymmetric compatibility can be introduced per class later.
    pub fn is_compatible_with(&self, other: &ContentClass) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Display for ContentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility() {
        assert!(ContentClass::maven2().is_compatible_with(&ContentClass::new("maven2")));
        assert!(!ContentClass::maven2().is_compatible_with(&ContentClass::maven1()));
    }

    #[test]
    fn test_serde_transparent() {
        let class: ContentClass = serde_yaml::from_str("maven2").unwrap();
        assert_eq!(class, ContentClass::maven2());
        assert_eq!(serde_yaml::to_string(&class).unwrap().trim(), "maven2");
    }
}
