//! Exit scheduler.
//!
//! Converts missing ether into a worker count and picks the next workers to
//! exit, oldest-activated first, strictly after the persisted exit cursor.
//! The cursor only moves forward, so no worker is ever selected twice.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use sluice_core::{ActivationIndex, Wei, WorkerRecord};

/// Number of workers whose nominal stake covers `missing` (ceiling)
///
/// # Errors
///
/// Returns error if `expected_per_worker` is zero
pub fn validators_needed(missing: Wei, expected_per_worker: Wei) -> Result<u64, PlanError> {
    let chunks = missing
        .chunks_of(expected_per_worker)
        .ok_or(PlanError::ZeroWorkerBalance)?;
    Ok(u64::try_from(chunks).unwrap_or(u64::MAX))
}

/// Fewer workers selected than the shortfall needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFulfillment {
    /// Workers the shortfall calls for
    pub needed: u64,
    /// Workers actually selected
    pub selected: u64,
    /// Whether the per-round exit cap, not the roster, limited the selection
    pub capped: bool,
}

impl PartialFulfillment {
    /// Workers still owed
    #[must_use]
    pub const fn deficit(&self) -> u64 {
        self.needed.saturating_sub(self.selected)
    }
}

/// Workers chosen to exit this round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSelection {
    /// Workers the shortfall calls for
    pub needed: u64,
    /// Selected workers, ascending by activation index
    pub selected: Vec<WorkerRecord>,
    /// Set when fewer than `needed` were selected
    pub partial: Option<PartialFulfillment>,
}

impl ExitSelection {
    /// Cursor value after committing this selection
    #[must_use]
    pub fn new_cursor(&self, current: Option<ActivationIndex>) -> Option<ActivationIndex> {
        self.selected.last().map(|w| w.activation_index).or(current)
    }

    /// Balance the selected workers are expected to release
    #[must_use]
    pub fn expected_inflow(&self) -> Wei {
        self.selected.iter().map(|w| w.balance).sum()
    }

    /// Check if no exits are requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Verify roster ordering and that the cursor lies within it
///
/// # Errors
///
/// Returns error if the roster is not strictly ascending by activation index
/// or the cursor points past its last worker
pub fn check_roster(
    roster: &[WorkerRecord],
    cursor: Option<ActivationIndex>,
) -> Result<(), PlanError> {
    for pair in roster.windows(2) {
        if pair[1].activation_index <= pair[0].activation_index {
            return Err(PlanError::RosterOutOfOrder {
                previous: pair[0].activation_index,
                next: pair[1].activation_index,
            });
        }
    }

    if let Some(cursor) = cursor {
        let last = roster.last().map(|w| w.activation_index);
        if last.is_none_or(|last| cursor > last) {
            return Err(PlanError::CursorPastRoster { cursor, last });
        }
    }

    Ok(())
}

/// Select up to `count` active workers strictly after `cursor`.
///
/// `needed` is the uncapped demand; when `count < needed` the selection is
/// marked as capped. Workers past the cursor that are no longer active
/// (exited on their own, or requested by another party) are skipped.
#[must_use]
pub fn select_next(
    roster: &[WorkerRecord],
    cursor: Option<ActivationIndex>,
    count: u64,
    needed: u64,
) -> ExitSelection {
    let take = usize::try_from(count).unwrap_or(usize::MAX);
    let start = match cursor {
        Some(cursor) => roster.partition_point(|w| w.activation_index <= cursor),
        None => 0,
    };

    let selected: Vec<WorkerRecord> = roster[start..]
        .iter()
        .filter(|w| w.status.is_active())
        .take(take)
        .cloned()
        .collect();

    let selected_count = selected.len() as u64;
    let partial = (selected_count < needed).then_some(PartialFulfillment {
        needed,
        selected: selected_count,
        capped: count < needed && selected_count == count,
    });

    ExitSelection {
        needed,
        selected,
        partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sluice_core::{Timestamp, WorkerStatus};
    use std::collections::BTreeSet;

    fn roster(n: u64) -> Vec<WorkerRecord> {
        (0..n)
            .map(|i| WorkerRecord::active(i, 1, i % 3, &format!("0x{:02x}", i), Wei::from_ether(32)))
            .collect()
    }

    fn indices(selection: &ExitSelection) -> Vec<u64> {
        selection
            .selected
            .iter()
            .map(|w| w.activation_index.as_u64())
            .collect()
    }

    #[test]
    fn test_validators_needed_ceiling() {
        assert_eq!(validators_needed(Wei::new(65), Wei::new(32)).unwrap(), 3);
        assert_eq!(validators_needed(Wei::new(64), Wei::new(32)).unwrap(), 2);
        assert_eq!(validators_needed(Wei::ZERO, Wei::new(32)).unwrap(), 0);
        assert_eq!(
            validators_needed(Wei::from_ether(65), Wei::from_ether(32)).unwrap(),
            3
        );
    }

    #[test]
    fn test_validators_needed_zero_balance() {
        assert_eq!(
            validators_needed(Wei::new(1), Wei::ZERO),
            Err(PlanError::ZeroWorkerBalance)
        );
    }

    #[test]
    fn test_select_after_cursor() {
        let workers = roster(10);
        let selection = select_next(&workers, Some(ActivationIndex::new(3)), 4, 4);
        assert_eq!(indices(&selection), vec![4, 5, 6, 7]);
        assert_eq!(
            selection.new_cursor(Some(ActivationIndex::new(3))),
            Some(ActivationIndex::new(7))
        );
        assert!(selection.partial.is_none());
    }

    #[test]
    fn test_select_from_start() {
        let workers = roster(5);
        let selection = select_next(&workers, None, 2, 2);
        assert_eq!(indices(&selection), vec![0, 1]);
    }

    #[test]
    fn test_partial_fulfillment() {
        let workers = roster(10);
        let selection = select_next(&workers, Some(ActivationIndex::new(7)), 4, 4);
        assert_eq!(indices(&selection), vec![8, 9]);
        let partial = selection.partial.unwrap();
        assert_eq!(partial.deficit(), 2);
        assert!(!partial.capped);
    }

    #[test]
    fn test_capped_selection() {
        let workers = roster(10);
        let selection = select_next(&workers, None, 2, 5);
        assert_eq!(indices(&selection), vec![0, 1]);
        assert!(selection.partial.unwrap().capped);
    }

    #[test]
    fn test_zero_count_keeps_cursor() {
        let workers = roster(3);
        let cursor = Some(ActivationIndex::new(1));
        let selection = select_next(&workers, cursor, 0, 0);
        assert!(selection.is_empty());
        assert_eq!(selection.new_cursor(cursor), cursor);
        assert!(selection.partial.is_none());
    }

    #[test]
    fn test_skips_non_active() {
        let mut workers = roster(6);
        workers[2].status = WorkerStatus::Exited;
        workers[3].status = WorkerStatus::ExitRequested {
            at: Timestamp::from_secs(1),
        };
        let selection = select_next(&workers, Some(ActivationIndex::new(0)), 3, 3);
        assert_eq!(indices(&selection), vec![1, 4, 5]);
    }

    #[test]
    fn test_sparse_indices() {
        let workers: Vec<_> = [2u64, 5, 9, 11]
            .iter()
            .map(|&i| WorkerRecord::active(i, 1, 1, &format!("0x{:02x}", i), Wei::from_ether(32)))
            .collect();
        let selection = select_next(&workers, Some(ActivationIndex::new(4)), 2, 2);
        assert_eq!(indices(&selection), vec![5, 9]);
    }

    #[test]
    fn test_check_roster() {
        let workers = roster(4);
        assert!(check_roster(&workers, None).is_ok());
        assert!(check_roster(&workers, Some(ActivationIndex::new(3))).is_ok());
        assert!(matches!(
            check_roster(&workers, Some(ActivationIndex::new(4))),
            Err(PlanError::CursorPastRoster { .. })
        ));
        assert!(matches!(
            check_roster(&[], Some(ActivationIndex::new(0))),
            Err(PlanError::CursorPastRoster { last: None, .. })
        ));

        let mut shuffled = roster(3);
        shuffled.swap(0, 2);
        assert!(matches!(
            check_roster(&shuffled, None),
            Err(PlanError::RosterOutOfOrder { .. })
        ));
    }

    #[test]
    fn test_expected_inflow() {
        let workers = roster(4);
        let selection = select_next(&workers, None, 3, 3);
        assert_eq!(selection.expected_inflow(), Wei::from_ether(96));
    }

    proptest! {
        #[test]
        fn prop_selections_disjoint_and_cursor_monotone(
            size in 0u64..60,
            counts in proptest::collection::vec(0u64..8, 1..12),
        ) {
            let mut workers = roster(size);
            let mut cursor: Option<ActivationIndex> = None;
            let mut seen = BTreeSet::new();

            for count in counts {
                let selection = select_next(&workers, cursor, count, count);
                prop_assert!(selection.selected.len() as u64 <= count);

                for w in &selection.selected {
                    prop_assert!(cursor.is_none_or(|c| w.activation_index > c));
                    prop_assert!(seen.insert(w.activation_index));
                }

                let next = selection.new_cursor(cursor);
                prop_assert!(next >= cursor);
                for w in &selection.selected {
                    let slot = w.activation_index.as_u64() as usize;
                    workers[slot].status = WorkerStatus::ExitRequested { at: Timestamp::from_secs(0) };
                }
                cursor = next;
            }
        }
    }
}
