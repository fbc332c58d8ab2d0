//! Notification coalescing for a flushed batch.
//!
//! Within one batch, only the last `add`, the last `change` and the last
//! `unlink` keep their notification; every earlier event of the same kind is
//! still replayed against the index but stays quiet. Renames are left alone,
//! nothing is dropped and nothing is reordered.

use super::event::{RawEvent, WatchOp};

const QUIETED_OPS: [WatchOp; 3] = [WatchOp::Add, WatchOp::Change, WatchOp::Unlink];

/// Returns a copy of `batch` with superseded notifications switched off.
pub fn coalesce_batch(batch: &[RawEvent]) -> Vec<RawEvent> {
    let last_index: Vec<(WatchOp, Option<usize>)> = QUIETED_OPS
        .iter()
        .map(|op| (*op, batch.iter().rposition(|event| event.op() == *op)))
        .collect();

    batch
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let superseded = last_index.iter().any(|(op, last)| {
                event.op() == *op && last.is_some_and(|last| index < last)
            });
            if superseded {
                event.clone().with_notify(false)
            } else {
                event.clone()
            }
        })
        .collect()
}
