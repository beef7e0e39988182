//! Level curve.
//!
//! Experience is tracked as progress inside the current level. Applying a
//! delta walks the curve up or down one level at a time; past the end of the
//! configured threshold sequence every level costs the last threshold.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result of applying an experience delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub level: u32,
    pub experience: u64,
    /// Requirement to leave `level`
    pub requirement: u64,
}

/// Ascending experience thresholds; index `n` is the cost of level `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCurve {
    thresholds: Vec<u64>,
}

impl LevelCurve {
    /// # Errors
    ///
    /// Rejects an empty sequence or a zero threshold.
    pub fn new(thresholds: Vec<u64>) -> Result<Self, ConfigError> {
        if thresholds.is_empty() || thresholds.contains(&0) {
            return Err(ConfigError::InvalidValue {
                key: "level_thresholds".into(),
                message: "need at least one positive threshold".into(),
            });
        }
        Ok(Self { thresholds })
    }

    /// Experience needed to go from `level` to `level + 1`.
    pub fn requirement(&self, level: u32) -> u64 {
        let idx = (level.max(1) - 1) as usize;
        self.thresholds[idx.min(self.thresholds.len() - 1)]
    }

    fn flat_from(&self) -> u32 {
        self.thresholds.len() as u32
    }

    /// Apply a signed delta. Never fails; at level 1 a negative total clamps
    /// to zero experience.
    pub fn apply_experience(&self, level: u32, experience: u64, delta: i64) -> LevelChange {
        let mut level = level.max(1);
        let mut total = i128::from(experience) + i128::from(delta);

        while total < 0 {
            if level <= 1 {
                total = 0;
                break;
            }
            level -= 1;
            total += i128::from(self.requirement(level));
        }

        loop {
            let required = i128::from(self.requirement(level));
            if level >= self.flat_from() {
                // Flat tail: every remaining level costs the same.
                let steps = (total / required).min(i128::from(u32::MAX - level));
                level += steps as u32;
                total -= steps * required;
                // Level saturated at u32::MAX
                total = total.min(required - 1);
                break;
            }
            if total < required {
                break;
            }
            total -= required;
            level += 1;
        }

        LevelChange {
            level,
            experience: u64::try_from(total).unwrap_or(u64::MAX),
            requirement: self.requirement(level),
        }
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            thresholds: vec![100, 300, 600, 1000, 1500, 2100, 2800, 3600, 4500, 5500],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn gaining_250_from_scratch_reaches_level_two() {
        let curve = LevelCurve::default();
        let change = curve.apply_experience(1, 0, 250);
        assert_eq!(
            change,
            LevelChange {
                level: 2,
                experience: 150,
                requirement: 300
            }
        );
    }

    #[test]
    fn losing_experience_delevels() {
        let curve = LevelCurve::default();
        let change = curve.apply_experience(2, 10, -50);
        assert_eq!(change.level, 1);
        assert_eq!(change.experience, 60);
        assert_eq!(change.requirement, 100);
    }

    #[test]
    fn level_one_clamps_at_zero() {
        let curve = LevelCurve::default();
        let change = curve.apply_experience(1, 20, -500);
        assert_eq!((change.level, change.experience), (1, 0));
    }

    #[test]
    fn past_the_table_requirement_is_flat() {
        let curve = LevelCurve::default();
        assert_eq!(curve.requirement(10), 5500);
        assert_eq!(curve.requirement(11), 5500);
        assert_eq!(curve.requirement(500), 5500);
        let change = curve.apply_experience(12, 0, 5500 * 3 + 7);
        assert_eq!((change.level, change.experience), (15, 7));
    }

    #[test]
    fn huge_delta_terminates() {
        let curve = LevelCurve::default();
        let change = curve.apply_experience(1, 0, i64::MAX);
        assert!(change.level > 10);
        assert!(change.experience < 5500);
    }

    #[test]
    fn rejects_empty_curve() {
        assert!(LevelCurve::new(vec![]).is_err());
        assert!(LevelCurve::new(vec![100, 0]).is_err());
    }

    fn valid_state() -> impl Strategy<Value = (u32, u64)> {
        (1u32..20).prop_flat_map(|level| {
            let req = LevelCurve::default().requirement(level);
            (Just(level), 0..req)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn never_below_level_one_or_zero_experience(
            level in 1u32..50,
            experience in 0u64..10_000,
            delta in -100_000i64..100_000,
        ) {
            let change = LevelCurve::default().apply_experience(level, experience, delta);
            prop_assert!(change.level >= 1);
            prop_assert!(change.experience < change.requirement);
        }

        #[test]
        fn gain_then_loss_round_trips((level, experience) in valid_state(), delta in 0i64..50_000) {
            let curve = LevelCurve::default();
            let up = curve.apply_experience(level, experience, delta);
            let down = curve.apply_experience(up.level, up.experience, -delta);
            prop_assert_eq!((down.level, down.experience), (level, experience));
        }
    }
}
