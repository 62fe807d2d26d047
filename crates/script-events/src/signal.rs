//! Signal identifiers.
//!
//! A [`Signal`] names "something happened" in the world. The same value is
//! matched against interaction triggers and counted by task subtasks, and it
//! travels over the wire as a plain string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Opaque, cheaply clonable identifier.
///
/// Clones share one allocation. Equality, ordering and hashing only look at
/// the identifier text.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(Arc<str>);

impl Signal {
    /// Creates a signal from an identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({:?})", &*self.0)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Signal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Signal {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl Borrow<str> for Signal {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Signal::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_equality_by_identifier() {
        let a = Signal::new("lever_pulled");
        let b = Signal::from(String::from("lever_pulled"));
        assert_eq!(a, b);
        assert_ne!(a, Signal::new("door_opened"));
    }

    #[test]
    fn test_lookup_by_str() {
        let mut counts: HashMap<Signal, u32> = HashMap::new();
        counts.insert(Signal::new("fish_caught"), 3);
        assert_eq!(counts.get("fish_caught"), Some(&3));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let signal = Signal::new("bell_rung");
        assert_eq!(serde_json::to_string(&signal).unwrap(), r#""bell_rung""#);

        let parsed: Signal = serde_json::from_str(r#""bell_rung""#).unwrap();
        assert_eq!(parsed, signal);
    }
}
