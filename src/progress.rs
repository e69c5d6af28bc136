//! Upload progress mapping.
//!
//! The transport reports absolute byte counts; the display only cares about a
//! small fixed step scale. [`UploadProgress`] converts one into the other and
//! hands the result to a [`ProgressSink`].

use crate::errors::DeployError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of discrete steps on the upload bar.
pub const PROGRESS_BAR_STEPS: u64 = 20;

/// Observer for upload progress, called from the transport's task.
///
/// Implementations must be cheap: a counter update or a terminal repaint.
pub trait ProgressSink: Send + Sync {
    /// Move the display to `step` (always within `0..=step_max`).
    fn set_step(&self, step: u64);

    /// The transport is done sending. Called at most once per upload.
    fn finish(&self) {}
}

/// Sink that ignores every update.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn set_step(&self, _step: u64) {}
}

/// Progress state for a single upload.
pub struct UploadProgress {
    total_bytes: u64,
    step_max: u64,
    bytes_read: AtomicU64,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProgress")
            .field("total_bytes", &self.total_bytes)
            .field("step_max", &self.step_max)
            .field("bytes_read", &self.bytes_read())
            .finish()
    }
}

impl UploadProgress {
    /// `total_bytes` must be non-zero; the step scale is fixed for the upload.
    pub fn new(
        total_bytes: u64,
        step_max: u64,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, DeployError> {
        if total_bytes == 0 {
            return Err(DeployError::InvalidArgument(
                "upload size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            total_bytes,
            step_max,
            bytes_read: AtomicU64::new(0),
            sink,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn step_max(&self) -> u64 {
        self.step_max
    }

    /// Highest byte count reported so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Step position for `bytes_read`, clamped to `[0, step_max]`.
    pub fn step_for(&self, bytes_read: u64) -> u64 {
        let step = (self.step_max as u128 * bytes_read as u128) / self.total_bytes as u128;
        step.min(self.step_max as u128) as u64
    }

    /// Record that the transport has read `bytes_read` bytes in total.
    ///
    /// Stale or duplicate notifications never move the display backwards.
    pub fn on_progress(&self, bytes_read: u64) {
        let previous = self.bytes_read.fetch_max(bytes_read, Ordering::Relaxed);
        let high_water = previous.max(bytes_read);
        self.sink.set_step(self.step_for(high_water));
    }

    pub fn finish(&self) {
        self.sink.finish();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Sink that records every step it is given.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub steps: Mutex<Vec<u64>>,
        pub finished: Mutex<u32>,
    }

    impl ProgressSink for RecordingSink {
        fn set_step(&self, step: u64) {
            self.steps.lock().unwrap().push(step);
        }

        fn finish(&self) {
            *self.finished.lock().unwrap() += 1;
        }
    }

    fn progress(total: u64) -> (UploadProgress, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let progress = UploadProgress::new(total, PROGRESS_BAR_STEPS, sink.clone()).unwrap();
        (progress, sink)
    }

    #[test]
    fn test_zero_total_is_rejected() {
        let err = UploadProgress::new(0, PROGRESS_BAR_STEPS, Arc::new(NoopSink)).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
    }

    #[test]
    fn test_steps_scale_linearly() {
        let (progress, sink) = progress(1000);
        progress.on_progress(0);
        progress.on_progress(500);
        progress.on_progress(1000);
        assert_eq!(*sink.steps.lock().unwrap(), vec![0, 10, 20]);
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let (progress, sink) = progress(100);
        progress.on_progress(250);
        assert_eq!(*sink.steps.lock().unwrap(), vec![20]);
    }

    #[test]
    fn test_out_of_order_updates_never_regress() {
        let (progress, sink) = progress(100);
        progress.on_progress(60);
        progress.on_progress(30);
        progress.on_progress(60);
        assert_eq!(*sink.steps.lock().unwrap(), vec![12, 12, 12]);
        assert_eq!(progress.bytes_read(), 60);
    }

    #[test]
    fn test_no_updates_is_fine() {
        let (progress, sink) = progress(100);
        assert!(sink.steps.lock().unwrap().is_empty());
        assert_eq!(progress.bytes_read(), 0);
    }

    #[test]
    fn test_finish_reaches_sink_once() {
        let (progress, sink) = progress(100);
        progress.finish();
        assert_eq!(*sink.finished.lock().unwrap(), 1);
    }

    #[test]
    fn test_huge_byte_counts_do_not_overflow() {
        let (progress, _) = progress(u64::MAX);
        assert_eq!(progress.step_for(u64::MAX), PROGRESS_BAR_STEPS);
        assert_eq!(progress.step_for(u64::MAX / 2), PROGRESS_BAR_STEPS / 2 - 1);
    }

    proptest! {
        #[test]
        fn prop_step_always_within_scale(
            total in 1u64..=u64::MAX,
            reads in proptest::collection::vec(any::<u64>(), 0..64),
        ) {
            let (progress, sink) = progress(total);
            for read in &reads {
                progress.on_progress(*read);
            }
            let steps = sink.steps.lock().unwrap();
            prop_assert_eq!(steps.len(), reads.len());
            prop_assert!(steps.iter().all(|s| *s <= PROGRESS_BAR_STEPS));
            prop_assert!(steps.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
