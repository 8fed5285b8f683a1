//! Change detection for reconciliation.

use crate::event::Event;

/// Whether two views of the same file's events differ.
///
/// Order doesn't matter: both sides are sorted by title (stable) and then
/// compared pairwise. Titles only line up the pairs; they are not identities,
/// so two same-titled events listed in a different order count as a change.
pub fn events_are_different(old: &[Event], new: &[Event]) -> bool {
    if old.len() != new.len() {
        return true;
    }

    let old = sorted_by_title(old);
    let new = sorted_by_title(new);
    old.iter().zip(&new).any(|(a, b)| a != b)
}

fn sorted_by_title(events: &[Event]) -> Vec<&Event> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by(|a, b| a.title().cmp(b.title()));
    sorted
}
