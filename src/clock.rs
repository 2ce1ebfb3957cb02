use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Time source for window arithmetic (`now`) and record timestamps (`timestamp`).
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Wall-clock time, truncated to microseconds so it survives storage unchanged.
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Clock that only moves when told to. Used to drive window resets in tests.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Instant, DateTime<Utc>)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new((Instant::now(), Utc::now().trunc_subsecs(6))),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.0 += by;
        state.1 += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().0
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.state.lock().1
    }
}
