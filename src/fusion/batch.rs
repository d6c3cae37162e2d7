use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::sample::Sample;

use super::Fusion;

/// Outcome of a batch over timepoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    /// Failed timepoints with the error message, in timepoint order.
    pub failed: Vec<(usize, String)>,
    /// Timepoints skipped after cancellation.
    pub cancelled: usize,
}

impl BatchReport {
    /// Whether every timepoint was fused.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

enum Outcome {
    Done,
    Failed(usize, String),
    Skipped,
}

/// Fuses many timepoints in parallel with one [`Fusion`].
///
/// Each timepoint is loaded, fused layer by layer and stored independently.
/// A failing timepoint is logged and counted; the others carry on.
pub struct FuseTimepoints<'a> {
    fusion: &'a Fusion,
    timepoints: Vec<usize>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> FuseTimepoints<'a> {
    /// Creates a new `FuseTimepoints` operation.
    #[must_use]
    pub fn new(fusion: &'a Fusion, timepoints: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fusion,
            timepoints: timepoints.into_iter().collect(),
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the batch.
    ///
    /// `load(t)` returns the buffers of timepoint `t` as `[view][layer]`;
    /// `store(t, fused)` receives one fused buffer per layer, in the sample
    /// type the views were loaded as.
    pub fn execute<T, L, S>(&self, load: L, store: S) -> BatchReport
    where
        T: Sample,
        L: Fn(usize) -> Result<Vec<Vec<Vec<T>>>> + Sync,
        S: Fn(usize, Vec<Vec<T>>) -> Result<()> + Sync,
    {
        let outcomes: Vec<Outcome> = self
            .timepoints
            .par_iter()
            .map(|&t| {
                if self.cancel.is_some_and(CancelToken::is_cancelled) {
                    return Outcome::Skipped;
                }
                let result = load(t)
                    .and_then(|views| self.fusion.fuse_layers::<T, T>(&views))
                    .and_then(|fused| store(t, fused));
                match result {
                    Ok(()) => Outcome::Done,
                    Err(e) => {
                        tracing::warn!(timepoint = t, error = %e, "fusion failed");
                        Outcome::Failed(t, e.to_string())
                    }
                }
            })
            .collect();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Done => report.succeeded += 1,
                Outcome::Failed(t, message) => report.failed.push((t, message)),
                Outcome::Skipped => report.cancelled += 1,
            }
        }
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "fusion batch finished"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SpimsphereError};
    use crate::fusion::{FusionParams, FusionView};
    use crate::math::Point3;
    use crate::mesh::MakeSphere;
    use crate::weight::UniformWeight;
    use parking_lot::Mutex;

    fn fusion() -> Fusion {
        let sphere = MakeSphere::new(Point3::origin(), 5.0, 2).execute().unwrap();
        let views = [FusionView::new(UniformWeight(1.0)), FusionView::new(UniformWeight(1.0))];
        Fusion::new(&sphere, &views, FusionParams::default()).unwrap()
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let fusion = fusion();
        let n = fusion.vertex_count();
        let stored = Mutex::new(Vec::new());
        let report = FuseTimepoints::new(&fusion, 0..6).execute(
            |t| {
                if t == 3 {
                    return Err(ConfigError::InvalidParameter("missing file".into()).into());
                }
                let value = u16::try_from(t).unwrap();
                Ok(vec![vec![vec![value; n]], vec![vec![value + 2; n]]])
            },
            |t, fused| {
                stored.lock().push((t, fused[0][0]));
                Ok(())
            },
        );
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 3);
        assert!(!report.is_complete());

        let mut stored = stored.into_inner();
        stored.sort_by_key(|(t, _)| *t);
        assert_eq!(stored.len(), 5);
        for (t, value) in stored {
            assert_eq!(value, u16::try_from(t).unwrap() + 1);
        }
    }

    #[test]
    fn cancelled_batch_skips_everything() {
        let fusion = fusion();
        let token = CancelToken::new();
        token.cancel();
        let report = FuseTimepoints::new(&fusion, 0..4)
            .with_cancel(&token)
            .execute::<u16, _, _>(
                |_| Err(SpimsphereError::Cancelled),
                |_, _| Ok(()),
            );
        assert_eq!(report.cancelled, 4);
        assert_eq!(report.succeeded, 0);
    }
}
