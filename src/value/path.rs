use std::fmt;
use std::str::FromStr;

use super::Value;
use crate::error::{Error, Result};

/// Dotted field path such as `a.b.c`. The empty path (`this`) names the
/// whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<String>);

impl Path {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn this() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path. `this` and the empty string are the root.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "this" {
            return Ok(Self::this());
        }
        let segments: Vec<String> = s.split('.').map(|p| p.to_string()).collect();
        if segments.iter().any(|p| p.is_empty()) {
            return Err(Error::invalid(format!("malformed field path \"{}\"", s)));
        }
        Ok(Self(segments))
    }

    pub fn is_this(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, used as an output field name
    pub fn leaf(&self) -> &str {
        self.0.last().map(|s| s.as_str()).unwrap_or("this")
    }

    /// Value at this path, or `None` when a step is missing
    pub fn deref(&self, v: &Value) -> Option<Value> {
        v.deref_path(&self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("this")
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = Path::parse("a.b").unwrap();
        assert_eq!(p.segments(), &["a".to_string(), "b".to_string()]);
        assert_eq!(p.to_string(), "a.b");
        assert_eq!(p.leaf(), "b");
        assert!(Path::parse("this").unwrap().is_this());
        assert!(Path::parse("a..b").is_err());
    }
}
