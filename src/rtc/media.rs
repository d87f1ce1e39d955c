//! Render frames → video track samples
//!
//! The render thread hands each captured frame to a [`FrameQueue`], which
//! encodes it and queues it without blocking. A tokio task drains the queue
//! and writes one sample per frame to the track. A full queue drops the
//! frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::render::FrameSink;

/// Turns a captured frame into track payload
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, data: &[u8], width: u32, height: u32, row_pitch: u32) -> Option<Bytes>;
}

/// Forwards frame bytes unchanged
///
/// For render instances whose frame-ready callback already carries an
/// encoded bitstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughEncoder;

impl FrameEncoder for PassthroughEncoder {
    fn encode(&self, data: &[u8], _width: u32, _height: u32, _row_pitch: u32) -> Option<Bytes> {
        if data.is_empty() {
            return None;
        }
        Some(Bytes::copy_from_slice(data))
    }
}

/// Producer half, called on the render thread
pub struct FrameQueue {
    tx: mpsc::Sender<Bytes>,
    encoder: Arc<dyn FrameEncoder>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half, drained by [`spawn_sample_writer`]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Bytes>,
    dropped: Arc<AtomicU64>,
}

/// Create a queue holding at most `capacity` frames
pub fn frame_queue(capacity: usize, encoder: Arc<dyn FrameEncoder>) -> (FrameQueue, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameQueue {
            tx,
            encoder,
            dropped: dropped.clone(),
        },
        FrameReceiver { rx, dropped },
    )
}

impl FrameQueue {
    /// Frames dropped because the writer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for FrameQueue {
    fn on_frame(&self, data: &[u8], width: u32, height: u32, row_pitch: u32) {
        let Some(payload) = self.encoder.encode(data, width, height, row_pitch) else {
            return;
        };

        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("Frame queue full, dropped frame ({} total)", total);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl FrameReceiver {
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Write queued frames to `track` until `cancel` fires or the queue closes
pub fn spawn_sample_writer(
    identifier: String,
    mut frames: FrameReceiver,
    track: Arc<TrackLocalStaticSample>,
    fps: u32,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<u64> {
    let duration = Duration::from_secs(1) / fps.max(1);

    tokio::spawn(async move {
        let mut written: u64 = 0;
        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => break,
                payload = frames.next() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            let sample = Sample {
                data: payload,
                duration,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                if written % 300 == 0 {
                    debug!("write_sample failed for {} (no peer?): {}", identifier, e);
                }
            }
            written += 1;
        }

        debug!(
            "Sample writer for {} stopped: {} written, {} dropped",
            identifier,
            written,
            frames.dropped()
        );
        written
    })
}
