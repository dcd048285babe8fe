//! Decides when buffered points are handed to the backend.

/// Flush once `point_count >= threshold`.
///
/// A threshold of `0` makes every insert flush immediately (unbuffered mode)
/// without any separate code path.
pub fn should_flush(point_count: usize, threshold: usize) -> bool {
    point_count >= threshold
}

/// Threshold-based flush policy owned by a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushPolicy {
    /// Buffered point count at which a flush is triggered.
    pub threshold: usize,
}

impl FlushPolicy {
    /// Policy flushing at `threshold` points.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Policy that flushes on every insert.
    pub fn unbuffered() -> Self {
        Self::new(0)
    }

    /// See [`should_flush`].
    pub fn should_flush(&self, point_count: usize) -> bool {
        should_flush(point_count, self.threshold)
    }
}
