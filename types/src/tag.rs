use crate::errors::TypeError;
use crate::TAG_MAX_LEN;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a replicated data unit. Uniqueness within a node's
/// tag set is by exact byte equality; construction enforces the wire slot
/// limit so any tag can be announced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParityTag(String);

impl ParityTag {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypeError::TagEmpty);
        }
        if value.len() > TAG_MAX_LEN {
            return Err(TypeError::TagTooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for ParityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ParityTag {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
