use std::time::{Duration, Instant};

/// Coalesces bursts of triggers into one firing. The first trigger arms a
/// deadline one window ahead; triggers while armed are absorbed. Used to keep
/// read receipts from flooding the relay when several messages land at once.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Debounce { window, deadline: None }
    }

    pub fn trigger(&mut self) {
        self.trigger_at(Instant::now());
    }

    pub fn trigger_at(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    /// When the pending firing is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and report whether a firing was due. The caller performs the
    /// debounced action when this returns true.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_collapses_into_one_firing() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        let start = Instant::now();

        debounce.trigger_at(start);
        debounce.trigger_at(start + Duration::from_millis(200));
        debounce.trigger_at(start + Duration::from_millis(900));

        // The deadline stays where the first trigger put it.
        assert_eq!(debounce.deadline(), Some(start + Duration::from_secs(1)));

        assert!(!debounce.take_due(start + Duration::from_millis(999)));
        assert!(debounce.take_due(start + Duration::from_secs(1)));
        assert!(debounce.deadline().is_none());
    }

    #[test]
    fn firing_rearms_on_the_next_trigger() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        let start = Instant::now();

        debounce.trigger_at(start);
        assert!(debounce.take_due(start + Duration::from_secs(1)));

        debounce.trigger_at(start + Duration::from_secs(2));
        assert_eq!(debounce.deadline(), Some(start + Duration::from_secs(3)));
    }

    #[test]
    fn idle_debounce_never_fires() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        assert!(!debounce.take_due(Instant::now()));
        assert!(debounce.deadline().is_none());
    }

    #[test]
    fn cancel_disarms() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        let start = Instant::now();
        debounce.trigger_at(start);
        debounce.cancel();
        assert!(!debounce.take_due(start + Duration::from_secs(5)));
    }
}
