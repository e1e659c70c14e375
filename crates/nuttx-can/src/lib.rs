//! nuttx-can: CAN frames over the NuttX character-device interface
//!
//! This crate opens a NuttX CAN device node (`/dev/canN`), translates between a
//! portable [`CanFrame`] and the kernel's `can_msg_s`, and moves one frame per
//! call behind a `poll(2)` readiness wait with a caller-supplied timeout. There
//! are no internal queues, threads or retries; the caller owns the loop. The
//! default build also enables a `mock` loopback so tooling runs on any host.

mod types;
pub use types::{CanFrame, Outcome, MAX_DATA_LEN, MAX_EXTENDED_ID};

mod error;
pub use error::{Error, ErrorKind, Result};

mod traits;
pub use traits::CanDevice;

pub mod compat;
pub mod msg;
pub use msg::HeaderLayout;

mod device;
pub use device::NuttxCan;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::LoopbackBus;
