#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;

use std::time::{Duration, Instant};

/// Marks the point in time a refresh was requested at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    generation: u64,
    deadline: Instant,
}

/// One-shot, expiring guard against stale snapshots.
///
/// Every local settlement bumps the generation and arms the guard. A refresh
/// whose ticket predates the armed generation is rejected once; the guard
/// disarms on that first decision or when the deadline passes.
#[derive(Debug, Clone)]
pub struct RefreshGuard {
    generation: u64,
    armed: Option<Armed>,
    ttl: Duration,
}

impl RefreshGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            generation: 0,
            armed: None,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    pub fn arm_at(&mut self, now: Instant) {
        self.generation += 1;
        self.armed = Some(Armed {
            generation: self.generation,
            deadline: now + self.ttl,
        });
    }

    pub fn ticket(&self) -> RefreshTicket {
        RefreshTicket {
            generation: self.generation,
        }
    }

    pub fn is_armed_at(&self, now: Instant) -> bool {
        self.armed.is_some_and(|armed| now < armed.deadline)
    }

    /// Returns true when the refresh for `ticket` must be skipped.
    pub fn consume(&mut self, ticket: RefreshTicket) -> bool {
        self.consume_at(ticket, Instant::now())
    }

    pub fn consume_at(&mut self, ticket: RefreshTicket, now: Instant) -> bool {
        let Some(armed) = self.armed.take() else {
            return false;
        };
        if now >= armed.deadline {
            log::trace!("refresh guard expired (generation {})", armed.generation);
            return false;
        }
        ticket.generation < armed.generation
    }
}
