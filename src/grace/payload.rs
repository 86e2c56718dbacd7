//! Epoch payload codec.
//!
//! The grace object's data payload is exactly 16 bytes: the current epoch
//! `cur` and the reclaim epoch `rec`, both little-endian u64. An epoch of
//! zero is never valid, so `rec == 0` means no grace period is in force and
//! recovery is not allowed.

use crate::core::error::{GraceError, GraceResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the encoded payload in bytes.
pub const PAYLOAD_SIZE: usize = 16;

/// The two epoch serial numbers stored in the grace object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epochs {
    /// Current epoch: tags recovery databases created by booting servers.
    pub cur: u64,
    /// Reclaim epoch: the epoch reclaim is allowed from; 0 means no grace.
    pub rec: u64,
}

impl Epochs {
    /// Payload written when the grace object is first created.
    pub const fn initial() -> Self {
        Self { cur: 1, rec: 0 }
    }

    /// True while a cluster-wide grace period is in force.
    pub const fn in_grace(&self) -> bool {
        self.rec != 0
    }

    /// Open a new grace period: the current epoch becomes the reclaim
    /// epoch and a fresh epoch is established.
    pub const fn open_grace(self) -> Self {
        Self {
            cur: self.cur + 1,
            rec: self.cur,
        }
    }

    /// Close the grace period, keeping the current epoch.
    pub const fn close_grace(self) -> Self {
        Self {
            cur: self.cur,
            rec: 0,
        }
    }

    /// Encode to the 16-byte wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PAYLOAD_SIZE);
        buf.put_u64_le(self.cur);
        buf.put_u64_le(self.rec);
        buf.freeze()
    }

    /// Decode from the wire form. Any length other than 16 bytes is
    /// corruption.
    pub fn decode(mut buf: &[u8]) -> GraceResult<Self> {
        if buf.len() != PAYLOAD_SIZE {
            return Err(GraceError::bad_payload(buf.len()));
        }
        Ok(Self {
            cur: buf.get_u64_le(),
            rec: buf.get_u64_le(),
        })
    }
}

impl std::fmt::Display for Epochs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cur={} rec={}", self.cur, self.rec)
    }
}
