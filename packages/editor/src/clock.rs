//! Time source and the throttling window

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds since an arbitrary fixed origin
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Debounce deadline rearmed by every local edit that produced patches
#[derive(Clone, PartialEq, Eq)]
pub struct Throttle {
    window_ms: u64,
    deadline: Option<u64>,
}

impl Throttle {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            deadline: None,
        }
    }

    /// Rearm; returns `true` when this starts a new window
    pub fn arm(&mut self, now_ms: u64) -> bool {
        let started = self.deadline.is_none();
        self.deadline = Some(now_ms + self.window_ms);
        started
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// End the window if its deadline has passed; returns `true` on that transition
    pub fn expire(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deadline {
            Some(deadline) => write!(f, "Throttle(until {deadline})"),
            None => write!(f, "Throttle(idle, {}ms)", self.window_ms),
        }
    }
}
