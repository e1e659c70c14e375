use std::thread;
use std::time::Duration;

use crate::{CanDevice, CanFrame, Outcome, Result};

/// An in-process loopback: the frame sent last comes back on the next receive.
///
/// Holds a single frame, so a second transmit before a receive times out the
/// way a full device would. An indefinite wait on an empty loopback returns
/// `TimedOut` since nothing could ever arrive.
#[derive(Debug, Default)]
pub struct LoopbackBus {
    pending: Option<CanFrame>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }
}

fn idle(timeout_ms: Option<u32>) {
    if let Some(ms) = timeout_ms {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl CanDevice for LoopbackBus {
    fn transmit(&mut self, frame: &CanFrame, timeout_ms: Option<u32>) -> Result<Outcome<()>> {
        // Reuse the kernel codec so invalid frames fail the same way.
        crate::msg::KernelMsg::from_frame(frame)?;
        if self.pending.is_some() {
            idle(timeout_ms);
            return Ok(Outcome::TimedOut);
        }
        self.pending = Some(*frame);
        Ok(Outcome::Ready(()))
    }

    fn receive_into(
        &mut self,
        frame: &mut CanFrame,
        timeout_ms: Option<u32>,
    ) -> Result<Outcome<()>> {
        match self.pending.take() {
            Some(sent) => {
                let len = usize::from(sent.len);
                frame.id = sent.id;
                frame.len = sent.len;
                frame.data[..len].copy_from_slice(&sent.data[..len]);
                Ok(Outcome::Ready(()))
            }
            None => {
                idle(timeout_ms);
                Ok(Outcome::TimedOut)
            }
        }
    }
}
