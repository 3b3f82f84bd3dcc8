use crate::common::DispatchError;
use std::num::NonZeroUsize;
use std::ops::Range;

/// Ordered partition of `total` targets into contiguous slices of at most
/// `batch_size`. Only the last slice may be shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total: usize,
    batch_size: NonZeroUsize,
}

impl BatchPlan {
    /// # Errors
    ///
    /// [`DispatchError::InvalidArgument`] when `max_concurrent` is zero.
    pub fn new(total: usize, max_concurrent: usize) -> Result<Self, DispatchError> {
        let batch_size = NonZeroUsize::new(max_concurrent).ok_or_else(|| {
            DispatchError::invalid_argument("max_concurrent", "must be a positive integer")
        })?;
        Ok(Self { total, batch_size })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn batch_count(&self) -> usize {
        self.total.div_ceil(self.batch_size.get())
    }

    /// Index ranges of each batch, in order.
    pub fn batches(&self) -> impl Iterator<Item = Range<usize>> + use<> {
        let total = self.total;
        let size = self.batch_size.get();
        (0..total)
            .step_by(size)
            .map(move |start| start..(start + size).min(total))
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().map(|range| range.len()).collect()
    }
}
