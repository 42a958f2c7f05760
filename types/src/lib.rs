pub mod announcement;
pub mod errors;
pub mod node;
pub mod policy;
pub mod routing;
pub mod tag;

/// Vector dimension carried by every node.
pub const DIM: usize = 8;
/// Upper bound on the neighbor list of a node.
pub const MAX_NEIGHBORS: usize = 16;
/// Upper bound on parity tags held by a node, and on knowledge-map entries.
pub const MAX_PARITY_TAGS: usize = 32;
/// Length of a SHA-256 digest rendered as lowercase hex.
pub const HASH_HEX_LEN: usize = 64;
/// Maximum byte length of a parity tag; one byte of each wire slot is
/// reserved for the terminating zero pad.
pub const TAG_MAX_LEN: usize = 63;
/// Byte width of a zero-padded tag slot on the wire.
pub const TAG_SLOT_LEN: usize = 64;
/// Byte width of the zero-padded signature on the wire.
pub const SIGNATURE_LEN: usize = 64;
