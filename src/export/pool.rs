//! Background export workers.
//!
//! One worker thread per bundle slot, each fed by its own bounded channel. The
//! capture loop computes filenames when it submits, so the frame counter stays
//! single-owner and filenames stay exactly what inline export would produce.
//! A full channel blocks the submitter, which bounds memory held by queued
//! frames.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use super::{ExportTarget, Exporter, FrameCounter};
use crate::frame::{Frame, Slot, StreamKind};

struct ExportJob {
    frame: Frame,
    kind: StreamKind,
    target: ExportTarget,
}

#[derive(Default)]
struct PoolState {
    written: AtomicU64,
    skipped: AtomicU64,
    /// First worker failure. Later failures are logged and dropped.
    error: Mutex<Option<anyhow::Error>>,
}

impl PoolState {
    fn error_slot(&self) -> MutexGuard<'_, Option<anyhow::Error>> {
        self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_error(&self, err: anyhow::Error) {
        let mut slot = self.error_slot();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            log::error!("export worker failed: {:#}", err);
        }
    }

    fn take_error(&self) -> Option<anyhow::Error> {
        self.error_slot().take()
    }
}

struct Lane {
    slot: Slot,
    tx: Option<SyncSender<ExportJob>>,
    join: Option<JoinHandle<()>>,
}

/// Pool of export workers, one per `Slot`.
pub struct ExportPool {
    lanes: Vec<Lane>,
    state: Arc<PoolState>,
}

impl ExportPool {
    /// Start the workers. `capacity` is the queue depth of each lane.
    pub fn spawn(exporter: Exporter, capacity: usize) -> Result<Self> {
        let state = Arc::new(PoolState::default());
        let mut lanes = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            let (tx, rx) = mpsc::sync_channel(capacity.max(1));
            let exporter = exporter.clone();
            let state_thread = state.clone();
            let join = std::thread::Builder::new()
                .name(format!("export-{:?}", slot).to_lowercase())
                .spawn(move || run_worker(rx, exporter, state_thread))
                .with_context(|| format!("spawn export worker for {:?}", slot))?;
            lanes.push(Lane {
                slot,
                tx: Some(tx),
                join: Some(join),
            });
        }
        log::info!(
            "export pool started: {} workers, queue depth {}",
            lanes.len(),
            capacity.max(1)
        );
        Ok(Self { lanes, state })
    }

    /// Queue `frame` for export. Blocks while the slot's queue is full.
    ///
    /// Fails with the first worker error once one has occurred.
    pub fn submit(&mut self, frame: Frame, slot: Slot, counter: FrameCounter) -> Result<()> {
        if let Some(err) = self.state.take_error() {
            return Err(err);
        }
        let target = ExportTarget::for_frame(&frame, slot.kind(), slot.sequence(), counter);
        let job = ExportJob {
            frame,
            kind: slot.kind(),
            target,
        };
        let lane = self
            .lanes
            .iter()
            .find(|lane| lane.slot == slot)
            .ok_or_else(|| anyhow!("no export worker for {:?}", slot))?;
        let tx = lane
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("export pool already finished"))?;
        if tx.send(job).is_err() {
            return Err(self
                .state
                .take_error()
                .unwrap_or_else(|| anyhow!("export worker for {:?} stopped", slot)));
        }
        Ok(())
    }

    /// Close every queue, wait for the workers to drain them and return
    /// `(written, skipped)` totals.
    pub fn finish(mut self) -> Result<(u64, u64)> {
        self.shutdown()?;
        if let Some(err) = self.state.take_error() {
            return Err(err);
        }
        Ok((
            self.state.written.load(Ordering::SeqCst),
            self.state.skipped.load(Ordering::SeqCst),
        ))
    }

    fn shutdown(&mut self) -> Result<()> {
        for lane in &mut self.lanes {
            lane.tx.take();
        }
        let mut panicked = Vec::new();
        for lane in &mut self.lanes {
            if let Some(join) = lane.join.take() {
                if join.join().is_err() {
                    panicked.push(lane.slot);
                }
            }
        }
        if !panicked.is_empty() {
            return Err(anyhow!("export worker(s) panicked: {:?}", panicked));
        }
        Ok(())
    }
}

impl Drop for ExportPool {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("{}", err);
        }
    }
}

fn run_worker(rx: Receiver<ExportJob>, exporter: Exporter, state: Arc<PoolState>) {
    for job in rx {
        match exporter.export_to(&job.frame, job.kind, &job.target) {
            Ok(Some(_)) => {
                state.written.fetch_add(1, Ordering::SeqCst);
            }
            Ok(None) => {
                state.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                state.record_error(err);
                // Dropping the receiver makes the next submit to this lane fail.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelFormat, StreamProfile, VideoLayout};

    fn ir_frame(index: u8, format: PixelFormat) -> Frame {
        let profile = StreamProfile::new(StreamKind::Infrared, index, format);
        let layout = VideoLayout::packed(3, 2, format);
        Frame::video(profile, layout, vec![7; layout.stride * 2])
    }

    #[test]
    fn pooled_export_matches_inline_names() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pool = ExportPool::spawn(Exporter::new(tmp.path()), 2)?;
        let mut counter = FrameCounter::new();

        for _ in 0..3 {
            pool.submit(ir_frame(0, PixelFormat::Y8), Slot::Infrared0, counter)?;
            pool.submit(ir_frame(1, PixelFormat::Y8), Slot::Infrared1, counter)?;
            counter.advance();
        }

        assert_eq!(pool.finish()?, (6, 0));
        for n in 0..3 {
            assert!(tmp.path().join(format!("infrared-0_{}.png", n)).exists());
            assert!(tmp.path().join(format!("infrared-1_{}.png", n)).exists());
        }
        assert!(tmp.path().join("Infrared 1-metadata.csv").exists());
        assert!(tmp.path().join("Infrared 2-metadata.csv").exists());
        Ok(())
    }

    #[test]
    fn worker_error_surfaces_on_finish() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pool = ExportPool::spawn(Exporter::new(tmp.path()), 4)?;

        pool.submit(ir_frame(0, PixelFormat::Rgb8), Slot::Infrared0, FrameCounter::new())?;

        let err = pool.finish().unwrap_err();
        assert!(err.downcast_ref::<crate::export::ExportError>().is_some());
        assert!(!tmp.path().join("infrared-0_0.png").exists());
        Ok(())
    }
}
