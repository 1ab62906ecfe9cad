//! Migration planning.
//!
//! A plan is the ordered list of units that need work to move the database
//! from its current version to a target version. Which units need work is
//! decided by each unit's own resolved status, not by its position relative
//! to the current version, so a migration that was skipped earlier and shows
//! up later is picked up by the next upward plan.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::MigrationUnit;

/// Direction a migration runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply.
    Up,
    /// Revert.
    Down,
}

impl Direction {
    /// Ledger flag written for a unit that ran in this direction.
    pub fn applied_flag(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// Lowercase name used in logs and child process environments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ordered work-list for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan<'a> {
    /// Direction every unit runs in.
    pub direction: Direction,
    /// Version the run started from.
    pub current: i64,
    /// Version the run is heading to.
    pub target: i64,
    /// Units in execution order.
    pub units: Vec<&'a MigrationUnit>,
}

impl<'a> MigrationPlan<'a> {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of units in the plan.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Versions in execution order.
    pub fn versions(&self) -> Vec<i64> {
        self.units.iter().map(|u| u.version).collect()
    }
}

/// Build the plan to move from `current` to `target`.
///
/// The direction is up when `target >= current`, down otherwise.
pub fn plan<'a>(
    units: &'a [MigrationUnit],
    current: i64,
    target: i64,
    status: &BTreeMap<i64, bool>,
) -> MigrationPlan<'a> {
    let direction = if target >= current {
        Direction::Up
    } else {
        Direction::Down
    };
    plan_in_direction(units, direction, current, target, status)
}

/// Build a plan with a fixed direction.
///
/// Up selects unapplied units at or below `target`, ascending. Down selects
/// applied units at or above `target`, descending.
pub fn plan_in_direction<'a>(
    units: &'a [MigrationUnit],
    direction: Direction,
    current: i64,
    target: i64,
    status: &BTreeMap<i64, bool>,
) -> MigrationPlan<'a> {
    let applied = |u: &MigrationUnit| status.get(&u.version).copied().unwrap_or(false);

    let mut selected: Vec<&MigrationUnit> = match direction {
        Direction::Up => units
            .iter()
            .filter(|u| u.version <= target && !applied(u))
            .collect(),
        Direction::Down => units
            .iter()
            .filter(|u| u.version >= target && applied(u))
            .collect(),
    };

    match direction {
        Direction::Up => selected.sort_by_key(|u| u.version),
        Direction::Down => selected.sort_by_key(|u| std::cmp::Reverse(u.version)),
    }

    MigrationPlan {
        direction,
        current,
        target,
        units: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MigrationKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn units(versions: &[i64]) -> Vec<MigrationUnit> {
        versions
            .iter()
            .map(|v| MigrationUnit {
                version: *v,
                name: format!("m{}", v),
                path: PathBuf::from(format!("{}_m{}.sql", v, v)),
                kind: MigrationKind::Sql,
            })
            .collect()
    }

    fn status(entries: &[(i64, bool)]) -> BTreeMap<i64, bool> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_direction_selection() {
        let u = units(&[1, 2, 3]);
        let s = status(&[(1, true), (2, true), (3, false)]);

        assert_eq!(plan(&u, 2, 3, &s).direction, Direction::Up);
        assert_eq!(plan(&u, 2, 2, &s).direction, Direction::Up);
        assert_eq!(plan(&u, 2, 1, &s).direction, Direction::Down);
    }

    #[test]
    fn test_up_plan_is_ascending_and_filtered() {
        let u = units(&[3, 1, 2, 4]);
        let s = status(&[(1, true), (2, false), (3, false), (4, false)]);

        let p = plan(&u, 1, 3, &s);
        assert_eq!(p.versions(), vec![2, 3]);
    }

    #[test]
    fn test_down_plan_is_descending_and_filtered() {
        let u = units(&[1, 2, 3]);
        let s = status(&[(1, true), (2, true), (3, true)]);

        let p = plan(&u, 3, 0, &s);
        assert_eq!(p.direction, Direction::Down);
        assert_eq!(p.versions(), vec![3, 2, 1]);

        let p = plan(&u, 3, 2, &s);
        assert_eq!(p.versions(), vec![3, 2]);
    }

    #[test]
    fn test_target_equal_current_is_empty_on_consistent_ledger() {
        let u = units(&[1, 2, 3]);
        let s = status(&[(1, true), (2, true), (3, false)]);
        assert!(plan(&u, 2, 2, &s).is_empty());
    }

    #[test]
    fn test_missing_middle_is_picked_up() {
        let u = units(&[1, 2, 3]);
        let s = status(&[(1, true), (2, false), (3, true)]);

        let p = plan(&u, 3, 3, &s);
        assert_eq!(p.direction, Direction::Up);
        assert_eq!(p.versions(), vec![2]);
    }

    #[test]
    fn test_unknown_status_counts_as_unapplied() {
        let u = units(&[1, 2]);
        let p = plan(&u, 0, 5, &BTreeMap::new());
        assert_eq!(p.versions(), vec![1, 2]);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_plan_in_direction_pins_down_to_current() {
        let u = units(&[1, 2, 3]);
        let s = status(&[(1, true), (2, true), (3, true)]);
        let p = plan_in_direction(&u, Direction::Down, 3, 3, &s);
        assert_eq!(p.versions(), vec![3]);
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::Up.applied_flag());
        assert!(!Direction::Down.applied_flag());
        assert_eq!(Direction::Down.to_string(), "down");
    }
}
