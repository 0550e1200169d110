//! Per-transmission trace record
//!
//! A [`Trace`] is created when a transmission is first seen (first accepted
//! packet, or audio entering the intake) and travels by value with every
//! message between pipeline stages, so log lines from different tasks can be
//! tied back to one transmission.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trace {
    pub id: Uuid,
    pub started: Instant,
}

impl Trace {
    /// Start a new trace at `started`
    pub fn new(started: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            started,
        }
    }

    /// Start a new trace now
    pub fn start() -> Self {
        Self::new(Instant::now())
    }

    /// Time since the trace started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First group of the UUID is plenty to tell traces apart in logs
        let id = self.id.simple().to_string();
        write!(f, "[{}]", &id[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traces_are_distinct() {
        let now = Instant::now();
        let a = Trace::new(now);
        let b = Trace::new(now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.started, b.started);
    }

    #[test]
    fn test_display_is_short() {
        let trace = Trace::start();
        let shown = trace.to_string();
        assert_eq!(shown.len(), 10);
        assert!(shown.starts_with('['));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed() {
        let trace = Trace::start();
        tokio::time::advance(Duration::from_millis(120)).await;
        assert_eq!(trace.elapsed(), Duration::from_millis(120));
    }
}
