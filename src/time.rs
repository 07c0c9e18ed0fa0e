//! Timeout-bounded polling.
//!
//! Waiting on hardware state never spins forever: callers give a monotonic
//! clock and a budget, and get `PollTimeout` back when the budget runs out.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    pub waited: u64,
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition not met after {} clock units", self.waited)
    }
}

/// Polls `ready` until it holds or `clock` has advanced `timeout` units past
/// the first reading. Returns the elapsed units on success.
pub fn poll_until<C, R>(mut clock: C, timeout: u64, mut ready: R) -> Result<u64, PollTimeout>
where
    C: FnMut() -> u64,
    R: FnMut() -> bool,
{
    let start = clock();
    loop {
        let elapsed = clock().wrapping_sub(start);
        if ready() {
            return Ok(elapsed);
        }
        if elapsed >= timeout {
            return Err(PollTimeout { waited: elapsed });
        }
        core::hint::spin_loop();
    }
}

/// A clock that advances by one on every reading. Used where no calibrated
/// time source exists yet.
pub fn spin_clock() -> impl FnMut() -> u64 {
    let mut now = 0u64;
    move || {
        now = now.wrapping_add(1);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_ready_condition_returns_elapsed() {
        let polls = Cell::new(0);
        let result = poll_until(spin_clock(), 100, || {
            polls.set(polls.get() + 1);
            polls.get() == 3
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_times_out() {
        let result = poll_until(spin_clock(), 10, || false);
        assert_eq!(result, Err(PollTimeout { waited: 10 }));
    }
}
