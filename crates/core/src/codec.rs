//! Wire encoding of fast-provisioning messages.
//!
//! # Wire Format
//!
//! A Fast-Prov-Info-Set starts with a little-endian 16-bit context-flags
//! bitmask; each set bit adds one field, in bit order:
//!
//! ```text
//! bit 0  address count      u16
//! bit 1  unicast min        u16
//! bit 2  unicast max        u16
//! bit 3  provisioning flags u8
//! bit 4  iv index           u32
//! bit 5  net key index      u16
//! bit 6  group address      u16
//! bit 7  provisioner addr   u16
//! bit 8  match filter       u8 length + bytes
//! bit 9  action             u8
//! ```
//!
//! All multi-byte fields are little-endian.

use meshroot_types::{
    Address, FastProvAction, FastProvAllocation, NetKeyIndex, MAX_MATCH_FILTER_LEN,
};
use thiserror::Error;

/// Every field except the provisioner address.
pub const INFO_SET_CTX_FLAGS: u16 = 0x037F;

const FLAG_ADDR_COUNT: u16 = 1 << 0;
const FLAG_UNICAST_MIN: u16 = 1 << 1;
const FLAG_UNICAST_MAX: u16 = 1 << 2;
const FLAG_PROV_FLAGS: u16 = 1 << 3;
const FLAG_IV_INDEX: u16 = 1 << 4;
const FLAG_NET_INDEX: u16 = 1 << 5;
const FLAG_GROUP_ADDR: u16 = 1 << 6;
const FLAG_PROV_ADDR: u16 = 1 << 7;
const FLAG_MATCH: u16 = 1 << 8;
const FLAG_ACTION: u16 = 1 << 9;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Message too short")]
    TooShort,

    #[error("Match filter too long: {0} bytes")]
    MatchFilterTooLong(usize),

    #[error("Unknown fast-prov action: 0x{0:02x}")]
    UnknownAction(u8),
}

/// Fast-Prov-Info-Set message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastProvInfoSet {
    pub ctx_flags: u16,
    pub addr_range_count: u16,
    pub unicast_min: Address,
    pub unicast_max: Address,
    pub flags: u8,
    pub iv_index: u32,
    pub net_index: NetKeyIndex,
    pub group_address: Address,
    pub prov_address: Address,
    pub match_filter: Vec<u8>,
    pub action: FastProvAction,
}

impl FastProvInfoSet {
    /// Build the message handing `allocation` to a node.
    pub fn from_allocation(
        allocation: &FastProvAllocation,
        action: FastProvAction,
    ) -> Result<Self, CodecError> {
        if allocation.match_filter.len() > MAX_MATCH_FILTER_LEN {
            return Err(CodecError::MatchFilterTooLong(allocation.match_filter.len()));
        }
        Ok(Self {
            ctx_flags: INFO_SET_CTX_FLAGS,
            addr_range_count: allocation.addr_range_count,
            unicast_min: allocation.unicast_min,
            unicast_max: allocation.unicast_max,
            flags: allocation.flags,
            iv_index: allocation.iv_index,
            net_index: allocation.net_index,
            group_address: allocation.group_address,
            prov_address: Address::UNASSIGNED,
            match_filter: allocation.match_filter.clone(),
            action,
        })
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.match_filter.len());
        out.extend_from_slice(&self.ctx_flags.to_le_bytes());
        let has = |flag: u16| self.ctx_flags & flag != 0;

        if has(FLAG_ADDR_COUNT) {
            out.extend_from_slice(&self.addr_range_count.to_le_bytes());
        }
        if has(FLAG_UNICAST_MIN) {
            out.extend_from_slice(&self.unicast_min.0.to_le_bytes());
        }
        if has(FLAG_UNICAST_MAX) {
            out.extend_from_slice(&self.unicast_max.0.to_le_bytes());
        }
        if has(FLAG_PROV_FLAGS) {
            out.push(self.flags);
        }
        if has(FLAG_IV_INDEX) {
            out.extend_from_slice(&self.iv_index.to_le_bytes());
        }
        if has(FLAG_NET_INDEX) {
            out.extend_from_slice(&self.net_index.0.to_le_bytes());
        }
        if has(FLAG_GROUP_ADDR) {
            out.extend_from_slice(&self.group_address.0.to_le_bytes());
        }
        if has(FLAG_PROV_ADDR) {
            out.extend_from_slice(&self.prov_address.0.to_le_bytes());
        }
        if has(FLAG_MATCH) {
            // Length is bounded by MAX_MATCH_FILTER_LEN at construction.
            out.push(self.match_filter.len() as u8);
            out.extend_from_slice(&self.match_filter);
        }
        if has(FLAG_ACTION) {
            out.push(self.action.as_byte());
        }
        out
    }

    /// Decode from wire format. Absent fields decode as zero.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader { data };
        let ctx_flags = reader.u16()?;
        let has = |flag: u16| ctx_flags & flag != 0;

        let mut msg = Self {
            ctx_flags,
            addr_range_count: 0,
            unicast_min: Address::UNASSIGNED,
            unicast_max: Address::UNASSIGNED,
            flags: 0,
            iv_index: 0,
            net_index: NetKeyIndex::PRIMARY,
            group_address: Address::UNASSIGNED,
            prov_address: Address::UNASSIGNED,
            match_filter: Vec::new(),
            action: FastProvAction::Reaffirm,
        };

        if has(FLAG_ADDR_COUNT) {
            msg.addr_range_count = reader.u16()?;
        }
        if has(FLAG_UNICAST_MIN) {
            msg.unicast_min = Address(reader.u16()?);
        }
        if has(FLAG_UNICAST_MAX) {
            msg.unicast_max = Address(reader.u16()?);
        }
        if has(FLAG_PROV_FLAGS) {
            msg.flags = reader.u8()?;
        }
        if has(FLAG_IV_INDEX) {
            msg.iv_index = reader.u32()?;
        }
        if has(FLAG_NET_INDEX) {
            msg.net_index = NetKeyIndex(reader.u16()?);
        }
        if has(FLAG_GROUP_ADDR) {
            msg.group_address = Address(reader.u16()?);
        }
        if has(FLAG_PROV_ADDR) {
            msg.prov_address = Address(reader.u16()?);
        }
        if has(FLAG_MATCH) {
            let len = reader.u8()? as usize;
            if len > MAX_MATCH_FILTER_LEN {
                return Err(CodecError::MatchFilterTooLong(len));
            }
            msg.match_filter = reader.bytes(len)?.to_vec();
        }
        if has(FLAG_ACTION) {
            let byte = reader.u8()?;
            msg.action = FastProvAction::from_byte(byte).ok_or(CodecError::UnknownAction(byte))?;
        }
        Ok(msg)
    }
}

/// Status answering a fast-provisioning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastProvStatus {
    /// Zero is success.
    pub code: u8,
}

impl FastProvStatus {
    /// Successful status.
    pub const SUCCESS: Self = FastProvStatus { code: 0 };

    /// Whether the status reports success.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Vec<u8> {
        vec![self.code]
    }

    /// Decode from wire format; trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let code = *data.first().ok_or(CodecError::TooShort)?;
        Ok(Self { code })
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() < len {
            return Err(CodecError::TooShort);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
