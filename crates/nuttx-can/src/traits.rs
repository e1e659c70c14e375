use crate::{CanFrame, Outcome, Result};

/// A blocking-with-timeout CAN endpoint carrying one frame per call.
///
/// Timeouts are in milliseconds: `Some(0)` returns immediately, `None` waits
/// indefinitely. Implementations never retry internally.
pub trait CanDevice {
    /// Send one frame.
    fn transmit(&mut self, frame: &CanFrame, timeout_ms: Option<u32>) -> Result<Outcome<()>>;

    /// Receive one frame into `frame`, leaving payload bytes past its length untouched.
    fn receive_into(&mut self, frame: &mut CanFrame, timeout_ms: Option<u32>)
        -> Result<Outcome<()>>;

    /// Receive one frame into a zeroed buffer.
    fn receive(&mut self, timeout_ms: Option<u32>) -> Result<Outcome<CanFrame>> {
        let mut frame = CanFrame::default();
        Ok(match self.receive_into(&mut frame, timeout_ms)? {
            Outcome::Ready(()) => Outcome::Ready(frame),
            Outcome::TimedOut => Outcome::TimedOut,
        })
    }
}
