use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Byte accounting with a hard limit and a high-water mark
#[derive(Debug)]
pub struct MemoryTracker {
    current_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    max_bytes: usize,
}

impl MemoryTracker {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            max_bytes,
        }
    }

    /// Reserve `bytes` if the limit allows it. Returns false when it would exceed the limit.
    pub fn try_allocate(&self, bytes: usize) -> bool {
        let result = self
            .current_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(bytes)?;
                (next <= self.max_bytes).then_some(next)
            });

        match result {
            Ok(previous) => {
                self.peak_bytes
                    .fetch_max(previous + bytes, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Record an allocation regardless of the limit
    pub fn allocate(&self, bytes: usize) {
        let new = self.current_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak_bytes.fetch_max(new, Ordering::SeqCst);
    }

    /// Release bytes, saturating at zero
    pub fn free(&self, bytes: usize) {
        let _ = self
            .current_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn current(&self) -> usize {
        self.current_bytes.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max_bytes
    }

    /// Fraction of the limit in use (0.0 to 1.0+)
    pub fn usage_ratio(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.current() as f64 / self.max_bytes as f64
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new(1024 * 1024 * 1024) // 1GB
    }
}

/// Serializable view of a tracker
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub max_bytes: usize,
    pub usage_ratio: f64,
}

impl From<&MemoryTracker> for MemoryStats {
    fn from(tracker: &MemoryTracker) -> Self {
        Self {
            current_bytes: tracker.current(),
            peak_bytes: tracker.peak(),
            max_bytes: tracker.max(),
            usage_ratio: tracker.usage_ratio(),
        }
    }
}
