use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, trace};

use crate::msg::{HeaderLayout, KernelMsg, MAX_MSG_LEN};
use crate::{CanDevice, CanFrame, Error, Outcome, Result};

/// An open NuttX CAN character device (`/dev/canN`).
///
/// Each transmit or receive is one `poll(2)` followed by at most one
/// `write(2)` or `read(2)`. Closing consumes the instance.
pub struct NuttxCan<D = File> {
    dev: D,
    layout: HeaderLayout,
}

impl NuttxCan<File> {
    /// Open `path` read-write and non-blocking.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, HeaderLayout::default())
    }

    /// Open `path` for a kernel whose message header uses `layout`.
    pub fn open_with(path: impl AsRef<Path>, layout: HeaderLayout) -> Result<Self> {
        let path = path.as_ref();
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), fd = dev.as_raw_fd(), "opened CAN device");
        Ok(Self { dev, layout })
    }
}

impl<D: AsFd + Read + Write> NuttxCan<D> {
    /// Wrap an already-open, non-blocking descriptor.
    pub fn from_device(dev: D) -> Self {
        Self::from_device_with(dev, HeaderLayout::default())
    }

    pub fn from_device_with(dev: D, layout: HeaderLayout) -> Self {
        Self { dev, layout }
    }

    /// Raw descriptor, for callers multiplexing several devices in their own poll loop.
    pub fn handle(&self) -> RawFd {
        self.dev.as_fd().as_raw_fd()
    }

    pub fn transmit(&mut self, frame: &CanFrame, timeout_ms: Option<u32>) -> Result<Outcome<()>> {
        let msg = KernelMsg::from_frame(frame)?;
        if !self.wait(PollFlags::POLLOUT, timeout_ms, "write")? {
            trace!(fd = self.handle(), "transmit timed out");
            return Ok(Outcome::TimedOut);
        }

        let (buf, len) = msg.encode(self.layout);
        let written = self.dev.write(&buf[..len]).map_err(Error::Write)?;
        if written != len {
            return Err(Error::ShortWrite {
                written,
                expected: len,
            });
        }
        trace!(id = frame.id, len = frame.len, "frame sent");
        Ok(Outcome::Ready(()))
    }

    pub fn receive_into(
        &mut self,
        frame: &mut CanFrame,
        timeout_ms: Option<u32>,
    ) -> Result<Outcome<()>> {
        if !self.wait(PollFlags::POLLIN, timeout_ms, "read")? {
            trace!(fd = self.handle(), "receive timed out");
            return Ok(Outcome::TimedOut);
        }

        let mut buf = [0u8; MAX_MSG_LEN];
        let n = self.dev.read(&mut buf).map_err(Error::Read)?;
        let bytes = buf.get(..n).ok_or(Error::BadLength(n))?;
        let msg = KernelMsg::decode(bytes, self.layout)?;
        msg.copy_into(frame);
        trace!(id = frame.id, len = frame.len, "frame received");
        Ok(Outcome::Ready(()))
    }

    /// Returns `Ok(false)` when the timeout expired with no event.
    fn wait(
        &self,
        events: PollFlags,
        timeout_ms: Option<u32>,
        expected: &'static str,
    ) -> Result<bool> {
        let mut fds = [PollFd::new(self.dev.as_fd(), events)];
        let ready = poll(&mut fds, poll_timeout(timeout_ms)).map_err(Error::Poll)?;
        if ready == 0 {
            return Ok(false);
        }
        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        if !revents.contains(events) {
            debug!(?revents, expected, "spurious wake-up");
            return Err(Error::ReadinessMismatch { expected });
        }
        Ok(true)
    }
}

impl<D: IntoRawFd> NuttxCan<D> {
    /// Release the descriptor, reporting a failing `close(2)`.
    pub fn close(self) -> Result<()> {
        let fd = self.dev.into_raw_fd();
        nix::unistd::close(fd).map_err(Error::Close)?;
        debug!(fd, "closed CAN device");
        Ok(())
    }
}

impl<D: AsFd> AsFd for NuttxCan<D> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.dev.as_fd()
    }
}

impl<D: AsFd> AsRawFd for NuttxCan<D> {
    fn as_raw_fd(&self) -> RawFd {
        self.dev.as_fd().as_raw_fd()
    }
}

impl<D: AsFd + Read + Write> CanDevice for NuttxCan<D> {
    fn transmit(&mut self, frame: &CanFrame, timeout_ms: Option<u32>) -> Result<Outcome<()>> {
        NuttxCan::transmit(self, frame, timeout_ms)
    }

    fn receive_into(
        &mut self,
        frame: &mut CanFrame,
        timeout_ms: Option<u32>,
    ) -> Result<Outcome<()>> {
        NuttxCan::receive_into(self, frame, timeout_ms)
    }
}

fn poll_timeout(timeout_ms: Option<u32>) -> PollTimeout {
    match timeout_ms {
        None => PollTimeout::NONE,
        Some(ms) => i32::try_from(ms)
            .ok()
            .and_then(|ms| PollTimeout::try_from(ms).ok())
            .unwrap_or(PollTimeout::MAX),
    }
}
