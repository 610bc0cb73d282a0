//! Tracking of occurrences already scheduled for the current message

use crate::{Occurrence, OccurrenceKey};
use std::collections::HashSet;

/// Occurrences already handed to the scheduler for the current message.
///
/// Identity is `(start, raw)`: streamed text only grows at the end, so an
/// earlier command keeps both its offset and its literal text across scans.
#[derive(Debug, Default, Clone)]
pub struct SeenOccurrences {
    keys: HashSet<OccurrenceKey>,
    order: Vec<Occurrence>,
}

impl SeenOccurrences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only unseen occurrences and mark them as seen.
    pub fn retain_new(&mut self, fresh: Vec<Occurrence>) -> Vec<Occurrence> {
        let mut out = Vec::new();
        for occ in fresh {
            if self.keys.insert(occ.key()) {
                self.order.push(occ.clone());
                out.push(occ);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every seen occurrence in text order, for replaying a whole message.
    pub fn replay(&self) -> Vec<Occurrence> {
        let mut all = self.order.clone();
        all.sort_by_key(|o| (o.start, o.kind().priority()));
        all
    }

    pub fn reset(&mut self) {
        self.keys.clear();
        self.order.clear();
    }
}
