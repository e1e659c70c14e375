//! Kernel CAN message codec.
//!
//! NuttX exchanges `struct can_msg_s` through `read(2)`/`write(2)` on the CAN
//! character device. The struct is packed: a 4-byte identifier in native byte
//! order, one byte of bitfields, then up to 8 data bytes. The length of a
//! message on the wire is `CAN_MSGLEN(dlc)`, never the full struct size.
//!
//! Everything here is pure and allocation-free so it can be exercised without
//! a device.

use crate::types::{CanFrame, MAX_DATA_LEN};
use crate::{Error, Result};

/// Size of `struct can_hdr_s`.
pub const HEADER_LEN: usize = 5;

/// Wire length of a message without payload.
pub const MIN_MSG_LEN: usize = msg_len(0);

/// Wire length of a full 8-byte message, also the receive buffer size.
pub const MAX_MSG_LEN: usize = msg_len(MAX_DATA_LEN as u8);

const DLC_MASK: u8 = 0x0F;
const RTR_BIT: u8 = 1 << 4;

/// `CAN_MSGLEN(nbytes)`: header plus payload.
pub const fn msg_len(dlc: u8) -> usize {
    HEADER_LEN + dlc as usize
}

/// Bitfield layout of the header flag byte.
///
/// `ch_error` only exists when the kernel is built with `CONFIG_CAN_ERRORS`,
/// and it shifts `ch_extid` up by one bit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HeaderLayout {
    #[default]
    Plain,
    WithErrorBit,
}

impl HeaderLayout {
    fn extid_bit(self) -> u8 {
        match self {
            HeaderLayout::Plain => 1 << 5,
            HeaderLayout::WithErrorBit => 1 << 6,
        }
    }
}

/// In-memory form of `struct can_msg_s`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KernelMsg {
    pub id: u32,
    pub dlc: u8,
    pub rtr: bool,
    pub extid: bool,
    pub data: [u8; MAX_DATA_LEN],
}

impl KernelMsg {
    /// Translate a generic frame for transmission.
    ///
    /// The extended-identifier flag is always set; the frame type is never
    /// inferred from the identifier's magnitude.
    pub fn from_frame(frame: &CanFrame) -> Result<Self> {
        let len = usize::from(frame.len);
        if len > MAX_DATA_LEN {
            return Err(Error::InvalidFrame("data length above 8"));
        }
        let mut data = [0u8; MAX_DATA_LEN];
        data[..len].copy_from_slice(&frame.data[..len]);
        Ok(Self {
            id: frame.id,
            dlc: frame.len,
            rtr: false,
            extid: true,
            data,
        })
    }

    /// Wire length of this message.
    pub fn wire_len(&self) -> usize {
        msg_len(self.dlc)
    }

    /// Serialize into a buffer; only the first `wire_len()` bytes are meaningful.
    pub fn encode(&self, layout: HeaderLayout) -> ([u8; MAX_MSG_LEN], usize) {
        let mut buf = [0u8; MAX_MSG_LEN];
        buf[..4].copy_from_slice(&self.id.to_ne_bytes());
        let mut flags = self.dlc & DLC_MASK;
        if self.rtr {
            flags |= RTR_BIT;
        }
        if self.extid {
            flags |= layout.extid_bit();
        }
        buf[4] = flags;
        let dlc = usize::from(self.dlc).min(MAX_DATA_LEN);
        buf[HEADER_LEN..HEADER_LEN + dlc].copy_from_slice(&self.data[..dlc]);
        (buf, self.wire_len())
    }

    /// Parse the bytes returned by one `read(2)`.
    pub fn decode(bytes: &[u8], layout: HeaderLayout) -> Result<Self> {
        if bytes.len() < MIN_MSG_LEN || bytes.len() > MAX_MSG_LEN {
            return Err(Error::BadLength(bytes.len()));
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[..4]);
        let flags = bytes[4];
        let dlc = flags & DLC_MASK;
        if usize::from(dlc) > MAX_DATA_LEN || bytes.len() < msg_len(dlc) {
            return Err(Error::BadDlc {
                dlc,
                len: bytes.len(),
            });
        }
        let len = usize::from(dlc);
        let mut data = [0u8; MAX_DATA_LEN];
        data[..len].copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + len]);
        Ok(Self {
            id: u32::from_ne_bytes(id),
            dlc,
            rtr: flags & RTR_BIT != 0,
            extid: flags & layout.extid_bit() != 0,
            data,
        })
    }

    /// Copy identifier, length and `dlc` payload bytes into `frame`.
    ///
    /// Payload bytes of `frame` past `dlc` keep whatever they held before.
    pub fn copy_into(&self, frame: &mut CanFrame) {
        let len = usize::from(self.dlc).min(MAX_DATA_LEN);
        frame.id = self.id;
        frame.len = self.dlc;
        frame.data[..len].copy_from_slice(&self.data[..len]);
    }
}
