//! OAuth2 scope vocabulary.
//!
//! A closed set of named bits. Parsing is fail-closed: one unknown or repeated name rejects
//! the whole request instead of granting a partial set.

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct Scopes(i32);

impl Scopes {
    pub const NONE: Scopes = Scopes(0);
    pub const IDENTIFY: Scopes = Scopes(1 << 0);
    pub const EMAIL: Scopes = Scopes(1 << 1);

    /// Canonical order used for serialization.
    const VOCABULARY: [(&'static str, Scopes); 2] =
        [("identify", Scopes::IDENTIFY), ("email", Scopes::EMAIL)];

    /// Build from stored bits, dropping anything outside the vocabulary.
    pub fn from_bits(bits: i32) -> Self {
        let known = Self::VOCABULARY.iter().fold(0, |acc, (_, s)| acc | s.0);
        Scopes(bits & known)
    }

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `required` is granted.
    pub fn contains(self, required: Scopes) -> bool {
        self.0 & required.0 == required.0
    }

    /// Parse a `+` or space separated scope string.
    ///
    /// Returns `None` for an empty string, an unknown name or a duplicate name.
    pub fn parse(input: &str) -> Option<Scopes> {
        if input.is_empty() {
            return None;
        }

        let mut flags = Scopes::NONE;
        for name in input.split([' ', '+']) {
            let (_, scope) = Self::VOCABULARY.iter().find(|(n, _)| *n == name)?;
            if flags.contains(*scope) {
                return None;
            }
            flags = flags | *scope;
        }
        Some(flags)
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::VOCABULARY
            .iter()
            .filter(|(_, scope)| self.contains(*scope))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for Scopes {
    type Output = Scopes;

    fn bitor(self, rhs: Scopes) -> Scopes {
        Scopes(self.0 | rhs.0)
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}

impl Serialize for Scopes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_in_any_order() {
        assert_eq!(Scopes::parse("identify"), Some(Scopes::IDENTIFY));
        assert_eq!(
            Scopes::parse("email+identify"),
            Some(Scopes::IDENTIFY | Scopes::EMAIL)
        );
        assert_eq!(
            Scopes::parse("identify email"),
            Some(Scopes::IDENTIFY | Scopes::EMAIL)
        );
    }

    #[test]
    fn rejects_unknown_duplicate_and_empty() {
        assert_eq!(Scopes::parse("identify+admin"), None);
        assert_eq!(Scopes::parse("identify+identify"), None);
        assert_eq!(Scopes::parse(""), None);
        assert_eq!(Scopes::parse("identify+"), None);
    }

    #[test]
    fn serializes_in_canonical_order() {
        let scopes = Scopes::parse("email+identify").unwrap();
        assert_eq!(scopes.to_string(), "identify email");
        assert_eq!(
            serde_json::to_value(scopes).unwrap(),
            serde_json::json!(["identify", "email"])
        );
    }

    #[test]
    fn from_bits_masks_unknown_bits() {
        assert_eq!(Scopes::from_bits(0b111), Scopes::IDENTIFY | Scopes::EMAIL);
        assert!(Scopes::from_bits(0b100).is_empty());
    }

    #[test]
    fn contains_requires_every_bit() {
        let granted = Scopes::IDENTIFY;
        assert!(granted.contains(Scopes::IDENTIFY));
        assert!(!granted.contains(Scopes::IDENTIFY | Scopes::EMAIL));
        assert!(granted.contains(Scopes::NONE));
    }
}
