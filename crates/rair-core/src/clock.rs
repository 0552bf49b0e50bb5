//! World clock and phase scheduling.
//!
//! Every sub-rate of the tick loop is a modulus over one counter rather
//! than a separate timer, so the phases of a tick always run in the same
//! order and never drift apart. The counter that the moduli are taken
//! over resets whenever the persistence phase fires; persistence is a
//! multiple of every other rate, so the reset never shifts a phase.

use crate::config::TickRates;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid rate configuration.
    #[error("invalid tick rates: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Which phases run on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPhases {
    /// The tick these phases belong to.
    pub tick: u64,
    /// Character bookkeeping, commands, and NPC AI.
    pub character_action: bool,
    /// Effect lifecycle ticks.
    pub buff: bool,
    /// Spawner population maintenance.
    pub spawner: bool,
    /// Save every character.
    pub persistence: bool,
    /// Half-rate cadence for NPC wandering.
    pub alternate: bool,
}

/// The monotonic tick counter of one world instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    tick: u64,
    cycle: u64,
    rates: TickRates,
}

impl Clock {
    /// A clock at tick zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the rates do not validate.
    pub fn new(rates: &TickRates) -> Result<Self, ClockError> {
        Self::from_parts(0, rates)
    }

    /// A clock resumed at `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the rates do not validate.
    pub fn from_parts(tick: u64, rates: &TickRates) -> Result<Self, ClockError> {
        rates.validate().map_err(|e| ClockError::InvalidConfig {
            reason: e.to_string(),
        })?;
        Ok(Self {
            tick,
            cycle: 0,
            rates: rates.clone(),
        })
    }

    /// Advance one tick and report which phases are due.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<TickPhases, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        self.cycle = self.cycle.saturating_add(1);

        let due = |rate: u64| self.cycle.checked_rem(rate).is_some_and(|r| r == 0);
        let phases = TickPhases {
            tick: self.tick,
            character_action: due(self.rates.character_action),
            buff: due(self.rates.buff),
            spawner: due(self.rates.spawner),
            persistence: due(self.rates.persistence),
            alternate: self.tick.checked_rem(2).is_some_and(|r| r == 0),
        };
        if phases.persistence {
            self.cycle = 0;
        }
        Ok(phases)
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Configured rates.
    pub const fn rates(&self) -> &TickRates {
        &self.rates
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rates(character_action: u64, buff: u64, spawner: u64, persistence: u64) -> TickRates {
        TickRates {
            character_action,
            buff,
            spawner,
            persistence,
        }
    }

    #[test]
    fn every_tick_rates_fire_every_tick() {
        let mut clock = Clock::new(&TickRates::default()).unwrap();
        let phases = clock.advance().unwrap();
        assert_eq!(phases.tick, 1);
        assert!(phases.character_action && phases.buff && phases.spawner);
        assert!(!phases.persistence);
    }

    #[test]
    fn persistence_fires_on_its_multiple_and_resets_the_cycle() {
        let mut clock = Clock::new(&rates(1, 2, 1, 4)).unwrap();
        let fired: Vec<(bool, bool)> = (0..8)
            .map(|_| {
                let p = clock.advance().unwrap();
                (p.buff, p.persistence)
            })
            .collect();
        assert_eq!(
            fired,
            vec![
                (false, false),
                (true, false),
                (false, false),
                (true, true),
                (false, false),
                (true, false),
                (false, false),
                (true, true),
            ]
        );
    }

    #[test]
    fn alternate_flips_each_tick() {
        let mut clock = Clock::new(&TickRates::default()).unwrap();
        let a = clock.advance().unwrap().alternate;
        let b = clock.advance().unwrap().alternate;
        assert_ne!(a, b);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            Clock::new(&rates(0, 1, 1, 10)),
            Err(ClockError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn persistence_must_be_a_multiple() {
        assert!(Clock::new(&rates(1, 3, 1, 10)).is_err());
        assert!(Clock::new(&rates(1, 5, 2, 10)).is_ok());
    }

    #[test]
    fn overflow_is_an_error() {
        let mut clock = Clock::from_parts(u64::MAX, &TickRates::default()).unwrap();
        assert!(matches!(clock.advance(), Err(ClockError::TickOverflow)));
    }
}
