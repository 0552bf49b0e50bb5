//! Base and bonus stat blocks.
//!
//! Base values are what content or save data says the character has.
//! Bonuses are the signed sum of every active effect's contribution and
//! are only ever changed through [`StatBlock::adjust_bonus`], which the
//! effect engine pairs with an exact inverse on teardown.

use std::collections::BTreeMap;

use rair_types::Stat;

/// A character's stats: base values plus effect bonuses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatBlock {
    base: BTreeMap<Stat, i64>,
    bonus: BTreeMap<Stat, i64>,
}

impl StatBlock {
    /// Create a block from base values with no bonuses.
    pub const fn from_base(base: BTreeMap<Stat, i64>) -> Self {
        Self {
            base,
            bonus: BTreeMap::new(),
        }
    }

    /// Effective value: base plus bonus.
    pub fn get(&self, stat: Stat) -> i64 {
        self.base_value(stat).saturating_add(self.bonus_value(stat))
    }

    /// Base value only.
    pub fn base_value(&self, stat: Stat) -> i64 {
        self.base.get(&stat).copied().unwrap_or(0)
    }

    /// Bonus value only.
    pub fn bonus_value(&self, stat: Stat) -> i64 {
        self.bonus.get(&stat).copied().unwrap_or(0)
    }

    /// Overwrite a base value.
    pub fn set_base(&mut self, stat: Stat, value: i64) {
        self.base.insert(stat, value);
    }

    /// Add `delta` to the bonus for `stat`. Zero bonuses are pruned.
    pub fn adjust_bonus(&mut self, stat: Stat, delta: i64) {
        let next = self.bonus_value(stat).saturating_add(delta);
        if next == 0 {
            self.bonus.remove(&stat);
        } else {
            self.bonus.insert(stat, next);
        }
    }

    /// All base values.
    pub const fn base(&self) -> &BTreeMap<Stat, i64> {
        &self.base
    }

    /// Effective values for every stat that has a base or a bonus.
    pub fn effective(&self) -> BTreeMap<Stat, i64> {
        let mut out = self.base.clone();
        for (stat, delta) in &self.bonus {
            let entry = out.entry(*stat).or_insert(0);
            *entry = entry.saturating_add(*delta);
        }
        out
    }

    /// Whether any bonus is currently applied.
    pub fn has_bonuses(&self) -> bool {
        !self.bonus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonus_stacks_on_base() {
        let mut block = StatBlock::from_base(BTreeMap::from([(Stat::Str, 10)]));
        block.adjust_bonus(Stat::Str, 3);
        assert_eq!(block.get(Stat::Str), 13);
        assert_eq!(block.base_value(Stat::Str), 10);
    }

    #[test]
    fn inverse_adjustment_clears_bonus() {
        let mut block = StatBlock::default();
        block.adjust_bonus(Stat::Perception, 40);
        block.adjust_bonus(Stat::Perception, -40);
        assert!(!block.has_bonuses());
        assert_eq!(block.get(Stat::Perception), 0);
    }

    #[test]
    fn effective_merges_bonus_only_stats() {
        let mut block = StatBlock::from_base(BTreeMap::from([(Stat::Dex, 5)]));
        block.adjust_bonus(Stat::IceResist, 20);
        let eff = block.effective();
        assert_eq!(eff.get(&Stat::Dex), Some(&5));
        assert_eq!(eff.get(&Stat::IceResist), Some(&20));
    }
}
