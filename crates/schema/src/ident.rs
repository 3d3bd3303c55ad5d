use super::Error;
use serde::{Deserialize, Serialize};

/// A validated SQL identifier. The grammar is deliberately conservative:
/// ASCII letters, digits and underscore, not starting with a digit, at most
/// 63 bytes (the Postgres NAMEDATALEN limit).
#[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let mut chars = name.chars();
        let legal = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !legal || name.len() > 63 {
            return Err(Error::IllegalIdentifier(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted rendering for SQL statements.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::ops::Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Identifier::new(name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::Identifier;

    #[test]
    fn grammar_accepts_and_rejects() {
        for ok in ["pois", "highway_lines", "_private", "t2", "a"] {
            assert!(Identifier::new(ok).is_ok(), "{ok} should be legal");
        }
        for bad in [
            "",
            "2fast",
            "with space",
            "quo\"te",
            "semi;colon",
            "dash-ed",
            "ünïcode",
            &"x".repeat(64),
        ] {
            assert!(Identifier::new(bad).is_err(), "{bad:?} should be illegal");
        }
        // 63 bytes is still fine.
        assert!(Identifier::new("x".repeat(63)).is_ok());
    }

    #[test]
    fn quoting() {
        assert_eq!(Identifier::new("pois").unwrap().quoted(), "\"pois\"");
    }
}
