//! Reclaim callbacks for `seize` retirement.
//!
//! Superseded snapshots and superseded slot values are handed to the
//! collector with these functions and freed once no guard can observe them.

use seize::Collector;

/// Reclaim a value allocated with `Box::into_raw` (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and be retired exactly once.
/// - Must only be called by the collector once no reader can hold `ptr`.
pub(crate) unsafe fn reclaim_boxed<T>(ptr: *mut T, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr is valid and from Box::into_raw.
    // Seize ensures no readers remain.
    unsafe { drop(Box::from_raw(ptr)) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn retired_boxes_are_dropped_by_the_collector() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let collector = Collector::new();
            for _ in 0..64 {
                let ptr = Box::into_raw(Box::new(DropCounter(Arc::clone(&drops))));
                // SAFETY: ptr is fresh from Box::into_raw and never shared.
                unsafe { collector.retire(ptr, reclaim_boxed::<DropCounter>) };
            }
        }
        assert_eq!(drops.load(Ordering::Relaxed), 64);
    }
}
