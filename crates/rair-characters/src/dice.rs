//! Dice rolling.

use rand::Rng;

/// Roll `count` dice with `sides` faces and sum them.
///
/// A die with zero sides contributes nothing.
pub fn roll<R: Rng + ?Sized>(rng: &mut R, count: u32, sides: u32) -> i64 {
    if sides == 0 {
        return 0;
    }
    let mut total: i64 = 0;
    for _ in 0..count {
        total = total.saturating_add(i64::from(rng.random_range(1..=sides)));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn single_sided_dice_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(roll(&mut rng, 10, 1), 10);
    }

    #[test]
    fn rolls_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let total = roll(&mut rng, 3, 6);
            assert!((3..=18).contains(&total));
        }
    }

    #[test]
    fn zero_sided_dice_roll_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(roll(&mut rng, 5, 0), 0);
    }
}
