//! Periodic world status logging.

use rair_core::runner::TickCallback;
use rair_core::tick::TickSummary;
use rair_core::world::World;
use tracing::info;

/// Logs a status line every `every` non-idle ticks.
pub struct StatusCallback {
    every: u64,
    reports: u64,
}

impl StatusCallback {
    /// Report every `every` ticks. Zero is treated as one.
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            reports: 0,
        }
    }

    /// Status lines written so far.
    #[cfg(test)]
    const fn reports(&self) -> u64 {
        self.reports
    }
}

impl TickCallback for StatusCallback {
    fn on_tick(&mut self, summary: &TickSummary, world: &World) {
        if summary.idle || summary.tick.checked_rem(self.every) != Some(0) {
            return;
        }
        self.reports = self.reports.saturating_add(1);
        info!(
            map = %world.map(),
            tick = summary.tick,
            players = summary.players,
            npcs = summary.npcs,
            spawners = world.spawners().count(),
            deaths = summary.deaths,
            "World status"
        );
    }
}
