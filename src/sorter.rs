//! Deterministic due-date ordering of the grading queue.
use crate::model::{QueueItem, SortOrder};

/// Order items by due date. Equal timestamps keep their input order.
/// Undated items go last for `OldestFirst` and first for `NewestFirst`.
pub fn sort_queue(items: Vec<QueueItem>, order: SortOrder) -> Vec<QueueItem> {
    let (mut dated, undated): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.due_at.is_some());

    // sort_by is stable
    match order {
        SortOrder::OldestFirst => dated.sort_by(|a, b| a.due_at.cmp(&b.due_at)),
        SortOrder::NewestFirst => dated.sort_by(|a, b| b.due_at.cmp(&a.due_at)),
    }

    match order {
        SortOrder::OldestFirst => {
            dated.extend(undated);
            dated
        }
        SortOrder::NewestFirst => {
            let mut out = undated;
            out.extend(dated);
            out
        }
    }
}
