use crate::errors::TypeError;
use crate::node::NodeId;
use crate::tag::ParityTag;
use crate::{MAX_PARITY_TAGS, SIGNATURE_LEN, TAG_SLOT_LEN};
use serde::{Deserialize, Serialize};

/// Total byte width of the fixed-layout wire record: node id, parity
/// count, zero-padded tag slots, load factor, timestamp, signature.
pub const WIRE_SIZE: usize = 4 + 4 + MAX_PARITY_TAGS * TAG_SLOT_LEN + 8 + 8 + SIGNATURE_LEN;

/// Signed snapshot of a node's parity holdings, broadcast to peers and
/// cached in their knowledge maps. The signature is a deterministic
/// function of `(node_id, timestamp)` under the placeholder scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityAnnouncement {
    pub node_id: NodeId,
    pub parity_tags: Vec<ParityTag>,
    pub load_factor: f64,
    pub timestamp: i64,
    pub signature: String,
}

impl ParityAnnouncement {
    pub fn parity_count(&self) -> usize {
        self.parity_tags.len()
    }

    /// Placeholder signature: deterministic given sender id and stamp.
    /// A real scheme must stay deterministic for the same sender state so
    /// announcement round-trips remain byte-stable.
    pub fn sign(node_id: NodeId, timestamp: i64) -> String {
        format!("SIG-{node_id}-{timestamp}")
    }

    /// Encodes the announcement into the fixed little-endian layout.
    /// Tags and signature are zero-padded into their slots.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![0u8; WIRE_SIZE];
        buf[0..4].copy_from_slice(&(self.node_id.0 as i32).to_le_bytes());
        buf[4..8].copy_from_slice(&(self.parity_tags.len() as i32).to_le_bytes());
        for (slot, tag) in self.parity_tags.iter().enumerate() {
            let start = 8 + slot * TAG_SLOT_LEN;
            let bytes = tag.as_bytes();
            buf[start..start + bytes.len()].copy_from_slice(bytes);
        }
        let tail = 8 + MAX_PARITY_TAGS * TAG_SLOT_LEN;
        buf[tail..tail + 8].copy_from_slice(&self.load_factor.to_le_bytes());
        buf[tail + 8..tail + 16].copy_from_slice(&self.timestamp.to_le_bytes());
        let sig = self.signature.as_bytes();
        let sig_len = sig.len().min(SIGNATURE_LEN);
        buf[tail + 16..tail + 16 + sig_len].copy_from_slice(&sig[..sig_len]);
        buf
    }

    /// Decodes a wire record, validating size, node id, parity count and
    /// tag slot contents.
    pub fn from_wire(data: &[u8]) -> Result<Self, TypeError> {
        if data.len() != WIRE_SIZE {
            return Err(TypeError::WireSizeMismatch {
                got: data.len(),
                expected: WIRE_SIZE,
            });
        }
        let node_id = i32::from_le_bytes(data[0..4].try_into().expect("sliced to width"));
        if node_id < 0 {
            return Err(TypeError::NegativeNodeId(node_id));
        }
        let count = i32::from_le_bytes(data[4..8].try_into().expect("sliced to width"));
        if !(0..=MAX_PARITY_TAGS as i32).contains(&count) {
            return Err(TypeError::ParityCountOutOfRange(count));
        }
        let mut parity_tags = Vec::with_capacity(count as usize);
        for slot in 0..count as usize {
            let start = 8 + slot * TAG_SLOT_LEN;
            let raw = &data[start..start + TAG_SLOT_LEN];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(TAG_SLOT_LEN);
            let text = std::str::from_utf8(&raw[..end]).map_err(|_| TypeError::TagNotUtf8(slot))?;
            parity_tags.push(ParityTag::new(text)?);
        }
        let tail = 8 + MAX_PARITY_TAGS * TAG_SLOT_LEN;
        let load_factor = f64::from_le_bytes(data[tail..tail + 8].try_into().expect("sliced"));
        let timestamp = i64::from_le_bytes(data[tail + 8..tail + 16].try_into().expect("sliced"));
        let sig_raw = &data[tail + 16..tail + 16 + SIGNATURE_LEN];
        let sig_end = sig_raw.iter().position(|&b| b == 0).unwrap_or(SIGNATURE_LEN);
        let signature = String::from_utf8_lossy(&sig_raw[..sig_end]).into_owned();
        Ok(Self {
            node_id: NodeId(node_id as usize),
            parity_tags,
            load_factor,
            timestamp,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ParityAnnouncement {
        let timestamp = 1_700_000_123;
        ParityAnnouncement {
            node_id: NodeId(7),
            parity_tags: vec![
                ParityTag::new("block-0042").unwrap(),
                ParityTag::new("block-0043").unwrap(),
            ],
            load_factor: 2.0,
            timestamp,
            signature: ParityAnnouncement::sign(NodeId(7), timestamp),
        }
    }

    #[test]
    fn test_wire_round_trip_is_bytewise_stable() {
        let announcement = sample();
        let wire = announcement.to_wire();
        assert_eq!(wire.len(), WIRE_SIZE);
        let decoded = ParityAnnouncement::from_wire(&wire).unwrap();
        assert_eq!(decoded, announcement);
        assert_eq!(decoded.to_wire(), wire);
    }

    #[test]
    fn test_wire_rejects_bad_sizes_and_counts() {
        let announcement = sample();
        let mut wire = announcement.to_wire();
        assert_eq!(
            ParityAnnouncement::from_wire(&wire[..WIRE_SIZE - 1]),
            Err(TypeError::WireSizeMismatch {
                got: WIRE_SIZE - 1,
                expected: WIRE_SIZE
            })
        );
        wire[4..8].copy_from_slice(&((MAX_PARITY_TAGS as i32) + 1).to_le_bytes());
        assert_eq!(
            ParityAnnouncement::from_wire(&wire),
            Err(TypeError::ParityCountOutOfRange(MAX_PARITY_TAGS as i32 + 1))
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        assert_eq!(
            ParityAnnouncement::sign(NodeId(3), 99),
            ParityAnnouncement::sign(NodeId(3), 99)
        );
        assert_eq!(ParityAnnouncement::sign(NodeId(3), 99), "SIG-3-99");
    }
}
