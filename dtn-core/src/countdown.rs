//! Countdown driving the exchange cycle: one tick per time unit, fires at -1.

/// Counts down from `interval` once per tick. The tick that brings it to -1
/// fires and resets it to `interval` in the same call, whatever the
/// exchange that follows does, so the cadence never drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    interval: u32,
    time_left: i64,
}

impl Countdown {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            time_left: i64::from(interval),
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn time_left(&self) -> i64 {
        self.time_left
    }

    /// Advance one unit. Returns true when the countdown expired.
    pub fn tick(&mut self) -> bool {
        self.time_left -= 1;
        if self.time_left == -1 {
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.time_left = i64::from(self.interval);
    }

    /// `HH:MM:SS` remaining, as shown on the station status line.
    pub fn remaining_hms(&self) -> String {
        let secs = self.time_left.max(0);
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_interval_plus_one_ticks() {
        let mut c = Countdown::new(5);
        let fired = (0..6).filter(|_| c.tick()).count();
        assert_eq!(fired, 1);
        assert_eq!(c.time_left(), 5);
    }

    #[test]
    fn does_not_fire_early() {
        let mut c = Countdown::new(5);
        for _ in 0..5 {
            assert!(!c.tick());
        }
        assert_eq!(c.time_left(), 0);
        assert!(c.tick());
    }

    #[test]
    fn keeps_cadence() {
        let mut c = Countdown::new(2);
        let fired: Vec<bool> = (0..9).map(|_| c.tick()).collect();
        assert_eq!(
            fired,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn zero_interval_fires_every_tick() {
        let mut c = Countdown::new(0);
        assert!(c.tick());
        assert!(c.tick());
        assert_eq!(c.time_left(), 0);
    }

    #[test]
    fn hms_formatting() {
        let c = Countdown::new(3725);
        assert_eq!(c.remaining_hms(), "01:02:05");
    }
}
