use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum TypeError {
    #[error("Parity tag of {0} bytes exceeds the {max} byte limit", max = crate::TAG_MAX_LEN)]
    TagTooLong(usize),
    #[error("Parity tag may not be empty")]
    TagEmpty,
    #[error("Wire record of {got} bytes, expected {expected}")]
    WireSizeMismatch { got: usize, expected: usize },
    #[error("Wire record carries negative node id {0}")]
    NegativeNodeId(i32),
    #[error("Wire record carries parity count {0} outside [0, {max}]", max = crate::MAX_PARITY_TAGS)]
    ParityCountOutOfRange(i32),
    #[error("Wire tag slot {0} is not valid UTF-8")]
    TagNotUtf8(usize),
    #[error("Invalid distribution policy: {0}")]
    PolicyViolation(String),
}
