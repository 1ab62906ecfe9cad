//! Deriving state from the ledger's event history.
//!
//! Two independent views are computed from the same history:
//!
//! - [`resolve_current_version`] finds the single head version of the
//!   database by walking the history newest-first.
//! - [`resolve_status`] finds every discovered migration's own applied flag
//!   from its most recent event.
//!
//! The two agree on a well-formed ledger, but neither relies on the other: a
//! ledger may show migration 3 applied while 2 is not, and that case is
//! handled rather than rejected.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationUnit;
use crate::history::LedgerRecord;

/// Resolve the current version from a newest-first history.
///
/// The first event seen for a version is authoritative for it. The first
/// version whose authoritative event is an apply is the current version.
pub fn resolve_current_version(history: &[LedgerRecord]) -> MigrateResult<i64> {
    let mut skip: HashSet<i64> = HashSet::new();

    for record in history {
        if skip.contains(&record.version) {
            continue;
        }

        if record.applied {
            return Ok(record.version);
        }

        skip.insert(record.version);
    }

    Err(MigrationError::LedgerCorrupt(format!(
        "no applied version among {} ledger records",
        history.len()
    )))
}

/// Resolve each unit's applied flag from its most recent ledger event.
///
/// Recency is `(timestamp, id)`: the latest timestamp wins and the insertion
/// id breaks ties. Units without any event resolve to not applied.
pub fn resolve_status(units: &[MigrationUnit], history: &[LedgerRecord]) -> BTreeMap<i64, bool> {
    latest_events(units, history)
        .into_iter()
        .map(|(version, record)| (version, record.is_some_and(|r| r.applied)))
        .collect()
}

/// Most recent ledger event for each unit, if any.
pub fn latest_events<'h>(
    units: &[MigrationUnit],
    history: &'h [LedgerRecord],
) -> BTreeMap<i64, Option<&'h LedgerRecord>> {
    let mut latest: HashMap<i64, &LedgerRecord> = HashMap::new();
    for record in history {
        latest
            .entry(record.version)
            .and_modify(|current| {
                if record.recency() > current.recency() {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    units
        .iter()
        .map(|unit| (unit.version, latest.get(&unit.version).copied()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MigrationKind;
    use crate::history::parse_timestamp;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn unit(version: i64) -> MigrationUnit {
        MigrationUnit {
            version,
            name: format!("m{}", version),
            path: PathBuf::from(format!("{}_m{}.sql", version, version)),
            kind: MigrationKind::Sql,
        }
    }

    fn rec(id: i64, version: i64, applied: bool) -> LedgerRecord {
        LedgerRecord::new(id, version, applied, None)
    }

    /// Newest-first, as the history query returns it.
    fn history(events: &[(i64, bool)]) -> Vec<LedgerRecord> {
        let mut records: Vec<_> = events
            .iter()
            .enumerate()
            .map(|(i, (v, a))| rec(i as i64 + 1, *v, *a))
            .collect();
        records.reverse();
        records
    }

    #[test]
    fn test_seed_only_resolves_to_zero() {
        assert_eq!(resolve_current_version(&[rec(1, 0, true)]).unwrap(), 0);
    }

    #[test]
    fn test_latest_applied_is_current() {
        let h = history(&[(0, true), (1, true), (2, true)]);
        assert_eq!(resolve_current_version(&h).unwrap(), 2);
    }

    #[test]
    fn test_reverted_head_is_skipped() {
        let h = history(&[(0, true), (1, true), (2, true), (2, false)]);
        assert_eq!(resolve_current_version(&h).unwrap(), 1);
    }

    #[test]
    fn test_older_apply_of_reverted_version_is_ignored() {
        // 2 applied, reverted, 1 reverted: the older apply of 2 must not win.
        let h = history(&[(0, true), (1, true), (2, true), (2, false), (1, false)]);
        assert_eq!(resolve_current_version(&h).unwrap(), 0);
    }

    #[test]
    fn test_reapplied_version_is_current() {
        let h = history(&[(0, true), (1, true), (1, false), (1, true)]);
        assert_eq!(resolve_current_version(&h).unwrap(), 1);
    }

    #[test]
    fn test_out_of_order_apply() {
        // 3 applied before 2 showed up; 2 applied last is the head.
        let h = history(&[(0, true), (1, true), (3, true), (2, true)]);
        assert_eq!(resolve_current_version(&h).unwrap(), 2);
    }

    #[test]
    fn test_no_applied_record_is_corrupt() {
        let err = resolve_current_version(&history(&[(1, false)])).unwrap_err();
        assert!(matches!(err, MigrationError::LedgerCorrupt(_)));

        let err = resolve_current_version(&[]).unwrap_err();
        assert!(matches!(err, MigrationError::LedgerCorrupt(_)));
    }

    #[test]
    fn test_status_uses_latest_event() {
        let units = vec![unit(1), unit(2), unit(3)];
        let h = history(&[(0, true), (1, true), (2, true), (2, false), (3, true)]);

        let status = resolve_status(&units, &h);
        assert_eq!(
            status,
            BTreeMap::from([(1, true), (2, false), (3, true)])
        );
    }

    #[test]
    fn test_status_missing_middle() {
        let units = vec![unit(1), unit(2), unit(3)];
        let h = history(&[(0, true), (1, true), (3, true)]);

        let status = resolve_status(&units, &h);
        assert_eq!(status[&2], false);
        assert_eq!(status[&3], true);
    }

    #[test]
    fn test_status_without_events_is_not_applied() {
        let units = vec![unit(5)];
        let status = resolve_status(&units, &[]);
        assert_eq!(status, BTreeMap::from([(5, false)]));
    }

    #[test]
    fn test_status_prefers_timestamp_over_scan_order() {
        let units = vec![unit(1)];
        // The record with the lower id carries the later timestamp.
        let h = vec![
            LedgerRecord::new(9, 1, false, parse_timestamp("2024-01-01 10:00:00")),
            LedgerRecord::new(8, 1, true, parse_timestamp("2024-01-01 11:00:00")),
        ];
        assert_eq!(resolve_status(&units, &h)[&1], true);
    }

    #[test]
    fn test_status_timestamp_tie_broken_by_id() {
        let units = vec![unit(1)];
        let ts = parse_timestamp("2024-01-01 10:00:00");
        let h = vec![
            LedgerRecord::new(7, 1, true, ts),
            LedgerRecord::new(8, 1, false, ts),
        ];
        assert_eq!(resolve_status(&units, &h)[&1], false);
    }

    #[test]
    fn test_latest_events_ignores_unknown_versions() {
        let units = vec![unit(1)];
        let h = history(&[(0, true), (1, true), (42, true)]);
        let latest = latest_events(&units, &h);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[&1].map(|r| r.id), Some(2));
    }
}
