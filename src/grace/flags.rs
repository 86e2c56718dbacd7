//! Per-node flag field.
//!
//! Each node-map entry carries a one-byte bitfield. An absent key reads the
//! same as an entry with every flag clear, so removing an entry and zeroing
//! its flags are interchangeable. Bits beyond the three defined here are
//! preserved across read-modify-write so newer writers can extend the field.

use bytes::Bytes;

bitflags::bitflags! {
    /// Flags recorded for a node in the grace object's map.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The node is on the cluster membership roster.
        const MEMBER = 0b0000_0001;
        /// The node is currently enforcing the grace period locally.
        const ENFORCING = 0b0000_0010;
        /// The node needs a grace period or is still recovering within one.
        const NEED_GRACE = 0b0000_0100;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl NodeFlags {
    /// Decode from a map value blob.
    ///
    /// An empty blob decodes to no flags, which keeps entries written by
    /// older tools (bare keys with zero-length values) readable. Extra
    /// bytes beyond the first are ignored.
    pub fn decode(blob: &[u8]) -> Self {
        match blob.first() {
            Some(byte) => Self::from_bits_retain(*byte),
            None => Self::empty(),
        }
    }

    /// Encode to the one-byte map value blob.
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.bits()])
    }
}

impl std::fmt::Display for NodeFlags {
    /// Fixed-width rendering for dump output: one column per flag.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.contains(Self::MEMBER) { 'M' } else { '-' },
            if self.contains(Self::ENFORCING) { 'E' } else { '-' },
            if self.contains(Self::NEED_GRACE) { 'N' } else { '-' },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let flags = NodeFlags::MEMBER | NodeFlags::NEED_GRACE;
        assert_eq!(NodeFlags::decode(&flags.encode()), flags);
    }

    #[test]
    fn empty_blob_means_no_flags() {
        assert_eq!(NodeFlags::decode(b""), NodeFlags::empty());
    }

    #[test]
    fn unknown_bits_survive() {
        let flags = NodeFlags::decode(&[0b1000_0101]);
        assert!(flags.contains(NodeFlags::MEMBER));
        assert_eq!(flags.bits(), 0b1000_0101);
        assert_eq!(NodeFlags::decode(&flags.encode()).bits(), 0b1000_0101);
    }

    #[test]
    fn display_is_fixed_width() {
        assert_eq!(NodeFlags::empty().to_string(), "---");
        assert_eq!(
            (NodeFlags::MEMBER | NodeFlags::NEED_GRACE).to_string(),
            "M-N"
        );
        assert_eq!(NodeFlags::all().to_string(), "MEN");
    }
}
