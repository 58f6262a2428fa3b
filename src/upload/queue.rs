//! Closed work queue of ranges waiting to be uploaded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::ByteRange;
use crate::source::{ReadAt, SectionView};

/// One queued item: a range and a view over exactly that part of the source.
#[derive(Debug)]
pub struct UploadUnit<R: ?Sized> {
    pub range: ByteRange,
    pub section: SectionView<R>,
}

impl<R: ReadAt + ?Sized> UploadUnit<R> {
    pub fn new(source: &Arc<R>, range: ByteRange) -> Self {
        Self {
            range,
            section: SectionView::new(Arc::clone(source), range.offset, range.length),
        }
    }
}

/// A queue that is fully populated on construction and only drained after.
#[derive(Debug)]
pub struct RangeQueue<R: ?Sized> {
    items: Mutex<VecDeque<UploadUnit<R>>>,
    total: usize,
}

impl<R: ReadAt + ?Sized> RangeQueue<R> {
    /// Seeds the queue with one unit per range, keeping the given order.
    pub fn seed(source: &Arc<R>, ranges: &[ByteRange]) -> Self {
        let items: VecDeque<_> = ranges
            .iter()
            .map(|range| UploadUnit::new(source, *range))
            .collect();
        let total = items.len();

        Self {
            items: Mutex::new(items),
            total,
        }
    }
}

impl<R: ?Sized> RangeQueue<R> {
    /// Takes the next unit, or `None` once the queue is exhausted.
    pub fn pop(&self) -> Option<UploadUnit<R>> {
        self.items.lock().pop_front()
    }

    /// Number of units the queue was seeded with.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of units not yet taken.
    pub fn remaining(&self) -> usize {
        self.items.lock().len()
    }
}
