use core::fmt;

/// Largest payload a classic CAN frame carries.
pub const MAX_DATA_LEN: usize = 8;

/// Largest identifier representable in an extended (29-bit) frame.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// A classic CAN data frame as seen by the rest of the stack.
///
/// Only the first `len` bytes of `data` are meaningful. The shim always sends
/// frames with the extended-identifier flag set, so `id` may use all 29 bits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct CanFrame {
    pub id: u32,
    pub len: u8,
    pub data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    /// Build a frame from an identifier and up to 8 payload bytes.
    pub fn new(id: u32, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LEN || id > MAX_EXTENDED_ID {
            return None;
        }
        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            len: data.len() as u8,
            data: buf,
        })
    }

    /// The meaningful part of the payload.
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.len).min(MAX_DATA_LEN);
        &self.data[..len]
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} [{}]", self.id, self.len)?;
        for b in self.payload() {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}

/// Result of a readiness-gated operation that did not fail.
///
/// `TimedOut` is an ordinary outcome: the caller owns the retry loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> Outcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(v) => Some(v),
            Outcome::TimedOut => None,
        }
    }
}
