use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin cursors, one per provider tier, shared by every dispatch made
/// through the same dispatcher.
///
/// A dispatch reads its tier's cursor once and walks its own offsets from
/// there, so interleaved dispatches can only skew where the next one starts.
#[derive(Debug)]
pub struct RotationState {
    cursors: Vec<AtomicUsize>,
}

impl RotationState {
    pub fn new(tiers: usize) -> Self {
        Self {
            cursors: (0..tiers).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn tiers(&self) -> usize {
        self.cursors.len()
    }

    pub fn current(&self, tier: usize, len: usize) -> usize {
        self.cursors[tier].load(Ordering::Acquire) % len.max(1)
    }

    pub fn move_past(&self, tier: usize, failed: usize, len: usize) -> usize {
        let len = len.max(1);
        let next = (failed % len + 1) % len;
        self.cursors[tier].store(next, Ordering::Release);
        next
    }

    pub fn snapshot(&self) -> Vec<usize> {
        self.cursors
            .iter()
            .map(|cursor| cursor.load(Ordering::Acquire))
            .collect()
    }
}
