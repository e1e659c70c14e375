//! Integer return-code convention for callers ported from C control loops:
//! `1` success, `0` timed out, `-1` any error.

use crate::{Outcome, Result};

pub const SUCCESS: i32 = 1;
pub const TIMED_OUT: i32 = 0;
pub const FAILURE: i32 = -1;

/// Collapse a transmit/receive result into `1`, `0` or `-1`.
pub fn return_code<T>(result: &Result<Outcome<T>>) -> i32 {
    match result {
        Ok(Outcome::Ready(_)) => SUCCESS,
        Ok(Outcome::TimedOut) => TIMED_OUT,
        Err(_) => FAILURE,
    }
}

/// Map a `poll(2)`-style timeout: negative waits forever, zero returns at once.
pub fn timeout_from_millis(timeout_msec: i32) -> Option<u32> {
    u32::try_from(timeout_msec).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn codes_follow_the_convention() {
        let ok: Result<Outcome<()>> = Ok(Outcome::Ready(()));
        let idle: Result<Outcome<()>> = Ok(Outcome::TimedOut);
        let bad: Result<Outcome<()>> = Err(Error::BadLength(2));
        assert_eq!(return_code(&ok), 1);
        assert_eq!(return_code(&idle), 0);
        assert_eq!(return_code(&bad), -1);
    }

    #[test]
    fn negative_timeout_means_forever() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), Some(0));
        assert_eq!(timeout_from_millis(250), Some(250));
    }
}
