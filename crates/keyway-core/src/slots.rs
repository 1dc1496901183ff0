//! Slot allocation policy.
//!
//! Slots are per-lock integer indexes in `1..=total_slots`. Allocation is
//! deterministic given current occupancy: the lowest free index wins.

/// Pick the lowest slot in `1..=total_slots` not present in `occupied`.
///
/// Returns `None` when every slot is taken.
pub fn lowest_free_slot(occupied: &[i64], total_slots: i64) -> Option<i64> {
    (1..=total_slots).find(|slot| !occupied.contains(slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_lowest_free_index() {
        assert_eq!(lowest_free_slot(&[], 10), Some(1));
        assert_eq!(lowest_free_slot(&[1, 2, 4], 10), Some(3));
        assert_eq!(lowest_free_slot(&[2, 3], 10), Some(1));
    }

    #[test]
    fn full_lock_yields_none() {
        assert_eq!(lowest_free_slot(&[1, 2, 3], 3), None);
    }

    #[test]
    fn allocation_is_deterministic() {
        let occupied = vec![1, 3, 5];
        assert_eq!(
            lowest_free_slot(&occupied, 8),
            lowest_free_slot(&occupied, 8)
        );
    }
}
