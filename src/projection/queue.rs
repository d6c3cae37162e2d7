use crossbeam::channel::{self, Receiver, SendError, Sender, TrySendError};

use crate::error::{ConfigError, QueueError, Result};
use crate::sample::Sample;

use super::{MaxProjector, Plane, StackStatus};

/// One acquired depth plane, tagged with its stack.
#[derive(Debug, Clone)]
pub struct Frame<T> {
    pub timepoint: usize,
    pub view: usize,
    pub z: usize,
    pub data: Vec<T>,
}

/// Acquisition side of a bounded frame queue.
#[derive(Debug, Clone)]
pub struct FrameProducer<T> {
    tx: Sender<Frame<T>>,
    capacity: usize,
}

/// Projection side of a bounded frame queue.
#[derive(Debug)]
pub struct FrameConsumer<T> {
    rx: Receiver<Frame<T>>,
}

/// Creates a queue holding at most `capacity` frames in flight.
#[must_use]
pub fn frame_queue<T>(capacity: usize) -> (FrameProducer<T>, FrameConsumer<T>) {
    let (tx, rx) = channel::bounded(capacity);
    (FrameProducer { tx, capacity }, FrameConsumer { rx })
}

impl<T> FrameProducer<T> {
    /// Enqueues a frame, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Disconnected`] if the consumer is gone.
    pub fn push(&self, frame: Frame<T>) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|SendError(_)| QueueError::Disconnected.into())
    }

    /// Enqueues a frame without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Overflow`] if the queue is full, since a frame
    /// the camera already delivered would otherwise be lost, and
    /// [`QueueError::Disconnected`] if the consumer is gone.
    pub fn try_push(&self, frame: Frame<T>) -> Result<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueError::Overflow {
                capacity: self.capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Disconnected.into()),
        }
    }

    /// Frames currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> FrameConsumer<T> {
    /// Dequeues the next frame, blocking until one arrives.
    ///
    /// Returns `None` once every producer is dropped and the queue is drained.
    #[must_use]
    pub fn pop(&self) -> Option<Frame<T>> {
        self.rx.recv().ok()
    }
}

/// Drains `consumer` into one projector per view.
///
/// A frame with `z == 0` resets its view's projector. Whenever a stack
/// completes, `on_stack(timepoint, view, projector)` receives the finished
/// buffers. Returns the number of completed stacks once all producers are
/// dropped.
///
/// # Errors
///
/// Returns an error if a frame names an unknown view, has the wrong size,
/// arrives out of order, or `on_stack` fails.
pub fn consume_frames<T, F>(
    consumer: &FrameConsumer<T>,
    projectors: &mut [MaxProjector<T>],
    width: usize,
    height: usize,
    mut on_stack: F,
) -> Result<usize>
where
    T: Sample,
    F: FnMut(usize, usize, &MaxProjector<T>) -> Result<()>,
{
    let mut completed = 0;
    while let Some(frame) = consumer.pop() {
        let views = projectors.len();
        let projector = projectors.get_mut(frame.view).ok_or_else(|| {
            ConfigError::InvalidParameter(format!(
                "frame for view {} but only {views} projectors",
                frame.view
            ))
        })?;
        if frame.z == 0 {
            projector.reset();
        }
        let plane = Plane::new(&frame.data, width, height)?;
        if projector.project_plane(frame.z, &plane)? == StackStatus::Complete {
            tracing::debug!(timepoint = frame.timepoint, view = frame.view, "stack projected");
            on_stack(frame.timepoint, frame.view, projector)?;
            completed += 1;
        }
    }
    Ok(completed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SpimsphereError;
    use crate::math::{Point3, Vector3};
    use crate::mesh::MakeSphere;
    use crate::projection::{
        BuildCorrespondenceTable, ProjectionParams, StackSource, VolumeGeometry,
    };
    use std::sync::Arc;
    use std::thread;

    fn frame(z: usize) -> Frame<u16> {
        Frame {
            timepoint: 0,
            view: 0,
            z,
            data: vec![0; 4],
        }
    }

    #[test]
    fn try_push_overflows_when_full() {
        let (producer, _consumer) = frame_queue::<u16>(1);
        producer.try_push(frame(0)).unwrap();
        assert_eq!(producer.len(), 1);
        assert!(matches!(
            producer.try_push(frame(1)),
            Err(SpimsphereError::Queue(QueueError::Overflow { capacity: 1 }))
        ));
    }

    #[test]
    fn push_fails_without_consumer() {
        let (producer, consumer) = frame_queue::<u16>(2);
        drop(consumer);
        assert!(matches!(
            producer.push(frame(0)),
            Err(SpimsphereError::Queue(QueueError::Disconnected))
        ));
    }

    #[test]
    fn pop_returns_none_after_producers_drop() {
        let (producer, consumer) = frame_queue::<u16>(2);
        producer.push(frame(3)).unwrap();
        drop(producer);
        assert_eq!(consumer.pop().map(|f| f.z), Some(3));
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn streamed_stacks_match_direct_projection() {
        let sphere = MakeSphere::new(Point3::new(8.0, 8.0, 8.0), 5.0, 3)
            .execute()
            .unwrap();
        let volume = VolumeGeometry::new(16, 16, 8, Vector3::new(1.0, 1.0, 2.0)).unwrap();
        let table = Arc::new(
            BuildCorrespondenceTable::new(&sphere, volume, ProjectionParams::default())
                .execute()
                .unwrap(),
        );
        let stack = |t: usize| -> Vec<Vec<u16>> {
            (0..8)
                .map(|z| {
                    (0..256)
                        .map(|i| u16::try_from((i * 13 + z * 31 + t * 101) % 997).unwrap())
                        .collect()
                })
                .collect()
        };

        let (producer, consumer) = frame_queue::<u16>(3);
        let acquisition = thread::spawn(move || {
            for t in 0..2 {
                for (z, data) in stack(t).into_iter().enumerate() {
                    producer
                        .push(Frame {
                            timepoint: t,
                            view: 0,
                            z,
                            data,
                        })
                        .unwrap();
                }
            }
        });

        let mut projectors = vec![MaxProjector::<u16>::new(Arc::clone(&table))];
        let mut results = Vec::new();
        let completed = consume_frames(&consumer, &mut projectors, 16, 16, |t, _, p| {
            results.push((t, p.buffer().to_vec()));
            Ok(())
        })
        .unwrap();
        acquisition.join().unwrap();

        assert_eq!(completed, 2);
        for (t, buffer) in results {
            let mut direct = MaxProjector::<u16>::new(Arc::clone(&table));
            direct
                .project_stack(&StackSource::InMemory {
                    planes: stack(t),
                    width: 16,
                    height: 16,
                })
                .unwrap();
            assert_eq!(buffer, direct.buffer());
        }
    }

    #[test]
    fn unknown_view_fails() {
        let sphere = MakeSphere::new(Point3::new(2.0, 2.0, 2.0), 1.0, 1)
            .execute()
            .unwrap();
        let volume = VolumeGeometry::new(2, 2, 2, Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let table = Arc::new(
            BuildCorrespondenceTable::new(&sphere, volume, ProjectionParams::default())
                .execute()
                .unwrap(),
        );
        let (producer, consumer) = frame_queue::<u16>(1);
        producer
            .push(Frame {
                view: 1,
                ..frame(0)
            })
            .unwrap();
        drop(producer);
        let mut projectors = vec![MaxProjector::<u16>::new(table)];
        assert!(consume_frames(&consumer, &mut projectors, 2, 2, |_, _, _| Ok(())).is_err());
    }
}
