//! Clamped resource pools.

/// A resource with a current value clamped to `[0, maximum]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePool {
    current: i64,
    maximum: i64,
}

impl ResourcePool {
    /// A full pool. Negative maxima are treated as zero.
    pub const fn full(maximum: i64) -> Self {
        let maximum = if maximum < 0 { 0 } else { maximum };
        Self {
            current: maximum,
            maximum,
        }
    }

    /// A pool at `current`, clamped into range.
    pub fn with_current(current: i64, maximum: i64) -> Self {
        let mut pool = Self::full(maximum);
        pool.current = current.clamp(0, pool.maximum);
        pool
    }

    /// Current value.
    pub const fn current(&self) -> i64 {
        self.current
    }

    /// Maximum value.
    pub const fn maximum(&self) -> i64 {
        self.maximum
    }

    /// Whether the pool is at zero.
    pub const fn is_empty(&self) -> bool {
        self.current == 0
    }

    /// Whether the pool is at its maximum.
    pub const fn is_full(&self) -> bool {
        self.current == self.maximum
    }

    /// Remove up to `amount`. Returns how much was actually removed.
    pub fn drain(&mut self, amount: i64) -> i64 {
        let amount = amount.max(0).min(self.current);
        self.current = self.current.saturating_sub(amount);
        amount
    }

    /// Restore up to `amount`. Returns how much was actually restored.
    pub fn restore(&mut self, amount: i64) -> i64 {
        let room = self.maximum.saturating_sub(self.current);
        let amount = amount.max(0).min(room);
        self.current = self.current.saturating_add(amount);
        amount
    }

    /// Refill to maximum.
    pub const fn refill(&mut self) {
        self.current = self.maximum;
    }

    /// Change the maximum, clamping the current value.
    pub fn set_maximum(&mut self, maximum: i64) {
        self.maximum = maximum.max(0);
        self.current = self.current.min(self.maximum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_stops_at_zero() {
        let mut hp = ResourcePool::full(10);
        assert_eq!(hp.drain(25), 10);
        assert!(hp.is_empty());
        assert_eq!(hp.drain(5), 0);
    }

    #[test]
    fn restore_stops_at_maximum() {
        let mut hp = ResourcePool::with_current(4, 10);
        assert_eq!(hp.restore(100), 6);
        assert!(hp.is_full());
    }

    #[test]
    fn lowering_maximum_clamps_current() {
        let mut mp = ResourcePool::full(50);
        mp.set_maximum(20);
        assert_eq!(mp.current(), 20);
        mp.set_maximum(80);
        assert_eq!(mp.current(), 20);
    }

    #[test]
    fn negative_inputs_are_ignored() {
        let mut hp = ResourcePool::with_current(5, 10);
        assert_eq!(hp.drain(-3), 0);
        assert_eq!(hp.restore(-3), 0);
        assert_eq!(hp.current(), 5);
    }
}
